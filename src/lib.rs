//! # sluice
//!
//! Composable, forward-only stream decorators for XML and binary payloads.
//!
//! Every decorator wraps one or more inner streams and exposes the same
//! [`Read`](std::io::Read)-based contract, so behaviors stack freely:
//! aggregate several documents into one ([`CompositeXmlStream`]), rewrite
//! namespaces in flight ([`XmlTranslatorStream`]), materialize missing
//! envelope levels ([`XmlEnvelopeDecodingStream`]), compress or extract zip
//! payloads ([`ZipOutputStream`], [`ZipInputStream`]), replicate consumed
//! bytes into a sink ([`ReplicatingReadStream`]) or observe exhaustion
//! ([`EventingReadStream`]). All work happens inside the consumer's `read`
//! calls; nothing is buffered beyond what correctness requires.
//!
//! ## Example
//!
//! ```
//! use sluice::{CompositeXmlStream, Stream};
//! use std::io::{Cursor, Read};
//!
//! let parts: Vec<Box<dyn Stream>> = vec![
//!     Box::new(Cursor::new(b"<a/>".to_vec())),
//!     Box::new(Cursor::new(b"<b/>".to_vec())),
//! ];
//! let mut aggregate = CompositeXmlStream::new(parts);
//! let mut document = String::new();
//! aggregate.read_to_string(&mut document).unwrap();
//! assert!(document.starts_with("<agg:Root"));
//! ```

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod io;
pub mod transform;
pub mod xml;

pub use cache::{ReadThroughCache, RegexCache};
pub use error::{Result, SluiceError};
pub use io::{
    Backlog, BufferController, CompositeXmlStream, EventingReadStream, MultipartFormDataStream,
    ReaderStream, ReplicatingReadStream, SeekableReadStream, Sink, SpillBuffer, Stream,
    ZipInputStream, ZipOutputStream,
};
pub use transform::{
    ExtensionRequirements, MessageContext, Transform, TransformArguments, TransformCache,
    TransformDescriptor, TransformInput, TransformProvider, Transformer, TransformerInput,
};
pub use xml::{
    BodyPath, BodySegment, NamespaceTranslation, TranslationOptions, TranslationSet,
    XmlEnvelopeDecodingStream, XmlTranslatorStream,
};

/// Version of the sluice library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
