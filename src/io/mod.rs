//! Stream decorators and the minimal stream capability surface
//!
//! Every decorator in this module wraps one or more inner streams, owns them,
//! and presents the same forward-only read contract with added behavior. All
//! work happens inside the calling thread's `read`; instances are
//! single-owner, single-consumer.

mod buffer;
mod composite;
mod eventing;
mod multipart;
mod replicating;
mod seekable;
mod spill;
mod zip;

pub use buffer::{Backlog, BufferController};
pub use composite::CompositeXmlStream;
pub use eventing::EventingReadStream;
pub use multipart::MultipartFormDataStream;
pub use replicating::ReplicatingReadStream;
pub use seekable::SeekableReadStream;
pub use spill::SpillBuffer;
pub use zip::{ZipInputStream, ZipOutputStream};

use crate::error::{Result, SluiceError};
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

/// Minimal capability surface shared by every stream decorator.
///
/// Sequential reading comes from [`Read`]; length, position and rewind are
/// optional capabilities that default to an
/// [`UnsupportedOperation`](SluiceError::UnsupportedOperation) failure.
/// Closing maps to [`Drop`]: ownership guarantees every inner stream is
/// released exactly once.
pub trait Stream: Read {
    /// Total length in bytes, when the stream can report it.
    fn byte_len(&mut self) -> Result<u64> {
        Err(SluiceError::UnsupportedOperation("length"))
    }

    /// Whether the stream can be rewound to its beginning.
    fn is_seekable(&self) -> bool {
        false
    }

    /// Reset the stream to produce its content from the start again.
    fn rewind_to_start(&mut self) -> Result<()> {
        Err(SluiceError::UnsupportedOperation("seek"))
    }

    /// Read the stream to its end, discarding the bytes. Returns the number
    /// of bytes discarded.
    fn drain(&mut self) -> Result<u64> {
        let mut scratch = [0u8; 8 * 1024];
        let mut total = 0u64;
        loop {
            let n = self.read(&mut scratch)?;
            if n == 0 {
                return Ok(total);
            }
            total += n as u64;
        }
    }
}

impl<S: Stream + ?Sized> Stream for Box<S> {
    fn byte_len(&mut self) -> Result<u64> {
        (**self).byte_len()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }

    fn rewind_to_start(&mut self) -> Result<()> {
        (**self).rewind_to_start()
    }
}

impl<T: AsRef<[u8]>> Stream for Cursor<T> {
    fn byte_len(&mut self) -> Result<u64> {
        Ok(self.get_ref().as_ref().len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn rewind_to_start(&mut self) -> Result<()> {
        self.set_position(0);
        Ok(())
    }
}

impl Stream for File {
    fn byte_len(&mut self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn rewind_to_start(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

/// Adapter presenting an arbitrary reader as a non-seekable [`Stream`].
pub struct ReaderStream<R: Read>(R);

impl<R: Read> ReaderStream<R> {
    /// Wrap `reader` as a forward-only stream.
    pub fn new(reader: R) -> Self {
        Self(reader)
    }

    /// Consume the adapter, returning the wrapped reader.
    pub fn into_inner(self) -> R {
        self.0
    }
}

impl<R: Read> Read for ReaderStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read> Stream for ReaderStream<R> {}

/// Write capability with an explicit, exactly-once commit step.
///
/// Used by [`ReplicatingReadStream`] to seal its target the first time the
/// source is exhausted. The default commit is a no-op so plain buffers
/// qualify as sinks.
pub trait Sink: Write {
    /// Seal the sink; invoked at most once per full exhaustion of the source.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }
}

impl Sink for Vec<u8> {}
