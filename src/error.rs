//! Error types for sluice

use thiserror::Error;

/// Result type alias for sluice operations
pub type Result<T> = std::result::Result<T, SluiceError>;

/// Error types that can occur in sluice
#[derive(Debug, Error)]
pub enum SluiceError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation not supported by the stream in its current state
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// Invalid argument at construction or call time
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Wrapped content violates an expected structural precondition
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A translation set maps one matching pattern to conflicting replacements
    #[error("Configuration conflict: {0}")]
    ConfigurationConflict(String),

    /// XML parse or write error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// Malformed XML attribute
    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    /// Zip archive error
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Invalid regular expression pattern
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}

impl SluiceError {
    /// Wrap this error into an `std::io::Error` so it can cross `Read`/`Write`
    /// trait boundaries without losing the typed cause.
    pub(crate) fn into_io(self) -> std::io::Error {
        match self {
            SluiceError::Io(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other),
        }
    }
}
