//! Frames a stream as a single-part `multipart/form-data` body
//!
//! The wrapped content is emitted between a generated boundary delimiter and
//! the closing delimiter, with an optional `Content-Disposition` header naming
//! the part:
//!
//! ```text
//! --{boundary}
//! Content-Disposition: form-data; name="{name}"
//!
//! ... wrapped content ...
//! --{boundary}--
//! ```
//!
//! Framing is produced strictly forward, so the wrapped stream never needs a
//! length or a seek; the matching media type for an HTTP request is available
//! through [`MultipartFormDataStream::content_type`].

use crate::error::{Result, SluiceError};
use crate::io::{Backlog, BufferController, Stream};
use std::collections::hash_map::RandomState;
use std::hash::{BuildHasher, Hasher};
use std::io::{self, Read};

/// Position indicator driving what bytes are synthesized next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Header,
    Content,
    Trailer,
    Done,
}

/// Wraps a stream as the single part of a `multipart/form-data` body.
pub struct MultipartFormDataStream<S: Read> {
    source: S,
    boundary: String,
    name: Option<String>,
    state: State,
    backlog: Backlog,
}

impl<S: Read> MultipartFormDataStream<S> {
    /// Wrap `source` as an anonymous part.
    pub fn new(source: S) -> Self {
        Self {
            source,
            boundary: generate_boundary(),
            name: None,
            state: State::Header,
            backlog: Backlog::new(),
        }
    }

    /// Wrap `source` as a part named `name` via a `Content-Disposition`
    /// header. The name must not be empty.
    pub fn with_name(source: S, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(SluiceError::InvalidArgument(
                "multipart part name must not be empty".to_owned(),
            ));
        }
        let mut stream = Self::new(source);
        stream.name = Some(name);
        Ok(stream)
    }

    /// The generated boundary delimiting the part.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Media type to send the body under, boundary parameter included.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary=\"{}\"", self.boundary)
    }

    fn header(&self) -> String {
        let mut header = format!("--{}\r\n", self.boundary);
        if let Some(name) = &self.name {
            header.push_str(&format!(
                "Content-Disposition: form-data; name=\"{name}\"\r\n"
            ));
        }
        header.push_str("\r\n");
        header
    }

    fn trailer(&self) -> String {
        format!("\r\n--{}--\r\n", self.boundary)
    }

    /// Produce the next structurally required fragment and advance the state
    /// machine.
    fn produce(&mut self, controller: &mut BufferController<'_>) -> io::Result<()> {
        match self.state {
            State::Header => {
                self.state = State::Content;
                controller.append(self.header().as_bytes(), &mut self.backlog);
            }
            State::Content => {
                let n = controller.append_read(&mut self.source)?;
                if n == 0 {
                    self.state = State::Trailer;
                }
            }
            State::Trailer => {
                self.state = State::Done;
                controller.append(self.trailer().as_bytes(), &mut self.backlog);
            }
            State::Done => {}
        }
        Ok(())
    }
}

impl<S: Read> Read for MultipartFormDataStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut controller = BufferController::new(buf);
        controller.drain_backlog(&mut self.backlog);
        while controller.availability() > 0 && self.state != State::Done {
            self.produce(&mut controller)?;
        }
        Ok(controller.count())
    }
}

impl<S: Read> Stream for MultipartFormDataStream<S> {}

/// Boundary unlikely to collide with the wrapped content; randomized per
/// instance so two bodies never share one.
fn generate_boundary() -> String {
    let state = RandomState::new();
    let a = state.build_hasher().finish();
    let b = state.build_hasher().finish();
    format!("{a:016x}{b:016x}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all<S: Read>(stream: &mut MultipartFormDataStream<S>, chunk: usize) -> String {
        let mut out = Vec::new();
        let mut buf = vec![0u8; chunk];
        loop {
            let n = stream.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn named_part_carries_a_content_disposition_header() {
        let mut stream =
            MultipartFormDataStream::with_name(Cursor::new(b"payload".to_vec()), "file").unwrap();
        let boundary = stream.boundary().to_owned();
        let body = read_all(&mut stream, 1024);
        assert_eq!(
            body,
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"\r\n\r\npayload\r\n--{boundary}--\r\n"
            )
        );
    }

    #[test]
    fn anonymous_part_has_no_headers() {
        let mut stream = MultipartFormDataStream::new(Cursor::new(b"payload".to_vec()));
        let boundary = stream.boundary().to_owned();
        let body = read_all(&mut stream, 1024);
        assert_eq!(body, format!("--{boundary}\r\n\r\npayload\r\n--{boundary}--\r\n"));
    }

    #[test]
    fn content_type_names_the_boundary() {
        let stream = MultipartFormDataStream::new(Cursor::new(Vec::new()));
        assert_eq!(
            stream.content_type(),
            format!("multipart/form-data; boundary=\"{}\"", stream.boundary())
        );
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let mut reference =
            MultipartFormDataStream::with_name(Cursor::new(b"some longer content".to_vec()), "p")
                .unwrap();
        let expected = read_all(&mut reference, 4096)
            .replace(reference.boundary(), "BOUNDARY");

        for chunk in [1usize, 2, 3, 7, 16, 61, 4096] {
            let mut stream = MultipartFormDataStream::with_name(
                Cursor::new(b"some longer content".to_vec()),
                "p",
            )
            .unwrap();
            let boundary = stream.boundary().to_owned();
            let body = read_all(&mut stream, chunk).replace(&boundary, "BOUNDARY");
            assert_eq!(body, expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn empty_source_still_produces_the_framing() {
        let mut stream = MultipartFormDataStream::new(Cursor::new(Vec::new()));
        let boundary = stream.boundary().to_owned();
        let body = read_all(&mut stream, 8);
        assert_eq!(body, format!("--{boundary}\r\n\r\n\r\n--{boundary}--\r\n"));
    }

    #[test]
    fn empty_part_name_is_rejected() {
        assert!(matches!(
            MultipartFormDataStream::with_name(Cursor::new(Vec::new()), ""),
            Err(SluiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn boundaries_differ_across_instances() {
        let a = MultipartFormDataStream::new(Cursor::new(Vec::new()));
        let b = MultipartFormDataStream::new(Cursor::new(Vec::new()));
        assert_ne!(a.boundary(), b.boundary());
    }

    #[test]
    fn read_after_done_returns_zero() {
        let mut stream = MultipartFormDataStream::new(Cursor::new(b"x".to_vec()));
        read_all(&mut stream, 32);
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }
}
