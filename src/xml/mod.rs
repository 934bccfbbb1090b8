//! XML-aware stream decorators
//!
//! These decorators parse their source with a pull reader, rewrite events and
//! re-serialize through a push writer whose output is delivered through the
//! usual backlog discipline. Output is always UTF-8.

mod envelope;
mod translation;
mod translator;

pub use envelope::{BodyPath, BodySegment, XmlEnvelopeDecodingStream};
pub use translation::{NamespaceTranslation, TranslationSet};
pub use translator::{TranslationOptions, XmlTranslatorStream};

use crate::error::{Result, SluiceError};

/// Namespace bound to the reserved `xml` prefix.
pub(crate) const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// One in-scope namespace binding: `None` is the default namespace.
pub(crate) type Binding = (Option<String>, String);

/// Stack of namespace binding frames, one frame per open element.
#[derive(Debug, Default)]
pub(crate) struct NsScopes {
    frames: Vec<Vec<Binding>>,
}

impl NsScopes {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_frame(&mut self, bindings: Vec<Binding>) {
        self.frames.push(bindings);
    }

    pub(crate) fn pop_frame(&mut self) {
        self.frames.pop();
    }

    /// Resolve `prefix` to its namespace URI, innermost binding first. The
    /// unbound default prefix is the empty namespace.
    pub(crate) fn resolve(&self, prefix: Option<&str>) -> &str {
        if prefix == Some("xml") {
            return XML_NAMESPACE;
        }
        self.frames
            .iter()
            .rev()
            .flat_map(|frame| frame.iter().rev())
            .find(|(p, _)| p.as_deref() == prefix)
            .map(|(_, uri)| uri.as_str())
            .unwrap_or("")
    }
}

/// Split a qualified name into prefix and local part, validating UTF-8.
pub(crate) fn split_qname(name: &[u8]) -> Result<(Option<String>, String)> {
    let name = std::str::from_utf8(name)
        .map_err(|_| SluiceError::MalformedInput("non-UTF-8 element or attribute name".to_owned()))?;
    match name.split_once(':') {
        Some((prefix, local)) => Ok((Some(prefix.to_owned()), local.to_owned())),
        None => Ok((None, name.to_owned())),
    }
}
