//! Aggregates several XML streams into one synthetic document
//!
//! The wrapped contents are concatenated under generated wrapper elements:
//!
//! ```text
//! <agg:Root xmlns:agg="urn:sluice:aggregate">
//!   <agg:Part_0>... content of 1st part ...</agg:Part_0>
//!   <agg:Part_1>... content of 2nd part ...</agg:Part_1>
//! </agg:Root>
//! ```
//!
//! Because aggregation happens at the byte level, every wrapped stream must
//! already be UTF-8 encoded XML without an XML declaration. This is a
//! documented precondition, not something this stream enforces: malformed
//! input surfaces as a parse failure in the downstream consumer.

use crate::error::{Result, SluiceError};
use crate::io::{Backlog, BufferController, Stream};
use std::io::{self, Read};

/// Namespace of the generated wrapper elements.
pub const AGGREGATE_NAMESPACE: &str = "urn:sluice:aggregate";

const ROOT_START_TAG: &str = "<agg:Root xmlns:agg=\"urn:sluice:aggregate\">";
const ROOT_END_TAG: &str = "</agg:Root>";

fn part_start_tag(index: usize) -> String {
    format!("<agg:Part_{index}>")
}

fn part_end_tag(index: usize) -> String {
    format!("</agg:Part_{index}>")
}

/// Position indicator driving what bytes are synthesized next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    RootStart,
    PartStart,
    PartContent,
    PartEnd,
    RootEnd,
    Done,
}

/// Aggregates N wrapped streams into one well-formed XML document.
pub struct CompositeXmlStream {
    parts: Vec<Box<dyn Stream>>,
    current: usize,
    state: State,
    backlog: Backlog,
}

impl CompositeXmlStream {
    /// Wrap `parts`. Zero parts yields a document with only the root element.
    pub fn new(parts: Vec<Box<dyn Stream>>) -> Self {
        Self {
            parts,
            current: 0,
            state: State::RootStart,
            backlog: Backlog::new(),
        }
    }

    /// Whether the stream is still in its initial state, nothing read yet.
    pub fn at_start(&self) -> bool {
        self.state == State::RootStart && self.backlog.is_empty()
    }

    /// Current position: defined (and zero) only while nothing has been read.
    pub fn position(&self) -> Result<u64> {
        if self.at_start() {
            Ok(0)
        } else {
            Err(SluiceError::UnsupportedOperation(
                "position after reading started",
            ))
        }
    }

    /// Hand back the wrapped streams, only valid while still at the beginning.
    pub fn into_parts(self) -> Result<Vec<Box<dyn Stream>>> {
        if self.at_start() {
            Ok(self.parts)
        } else {
            Err(SluiceError::UnsupportedOperation(
                "unwrap after reading started",
            ))
        }
    }

    /// Number of wrapped streams.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Produce the next structurally required fragment and advance the state
    /// machine.
    fn produce(&mut self, controller: &mut BufferController<'_>) -> io::Result<()> {
        match self.state {
            State::RootStart => {
                self.state = if self.parts.is_empty() {
                    State::RootEnd
                } else {
                    State::PartStart
                };
                controller.append(ROOT_START_TAG.as_bytes(), &mut self.backlog);
            }
            State::PartStart => {
                self.state = State::PartContent;
                controller.append(part_start_tag(self.current).as_bytes(), &mut self.backlog);
            }
            State::PartContent => {
                let n = controller.append_read(&mut self.parts[self.current])?;
                if n == 0 {
                    self.state = State::PartEnd;
                }
            }
            State::PartEnd => {
                controller.append(part_end_tag(self.current).as_bytes(), &mut self.backlog);
                self.current += 1;
                self.state = if self.current < self.parts.len() {
                    State::PartStart
                } else {
                    State::RootEnd
                };
            }
            State::RootEnd => {
                self.state = State::Done;
                controller.append(ROOT_END_TAG.as_bytes(), &mut self.backlog);
            }
            State::Done => {}
        }
        Ok(())
    }
}

impl Read for CompositeXmlStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut controller = BufferController::new(buf);
        // exhaust the backlog first, keeping whatever overflows
        controller.drain_backlog(&mut self.backlog);
        while controller.availability() > 0 && self.state != State::Done {
            self.produce(&mut controller)?;
        }
        Ok(controller.count())
    }
}

impl Stream for CompositeXmlStream {
    /// Length is computable only when every wrapped stream reports one.
    fn byte_len(&mut self) -> Result<u64> {
        let mut length = (ROOT_START_TAG.len() + ROOT_END_TAG.len()) as u64;
        for (i, part) in self.parts.iter_mut().enumerate() {
            length += part.byte_len()?;
            length += (part_start_tag(i).len() + part_end_tag(i).len()) as u64;
        }
        Ok(length)
    }

    fn is_seekable(&self) -> bool {
        self.parts.iter().all(|p| p.is_seekable())
    }

    /// Reset every wrapped stream and the state machine; fails if any wrapped
    /// stream cannot seek.
    fn rewind_to_start(&mut self) -> Result<()> {
        for part in &mut self.parts {
            if !part.is_seekable() {
                return Err(SluiceError::UnsupportedOperation(
                    "rewind with a non-seekable part",
                ));
            }
        }
        for part in &mut self.parts {
            part.rewind_to_start()?;
        }
        log::debug!("composite stream rewound to start ({} parts)", self.parts.len());
        self.current = 0;
        self.state = State::RootStart;
        self.backlog.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ReaderStream;
    use std::io::Cursor;

    fn parts(fragments: &[&str]) -> Vec<Box<dyn Stream>> {
        fragments
            .iter()
            .map(|f| Box::new(Cursor::new(f.as_bytes().to_vec())) as Box<dyn Stream>)
            .collect()
    }

    fn read_all(stream: &mut CompositeXmlStream, chunk: usize) -> String {
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
    fn zero_parts_emit_only_root_tags() {
        let mut stream = CompositeXmlStream::new(Vec::new());
        let doc = read_all(&mut stream, 64);
        assert_eq!(doc, format!("{ROOT_START_TAG}{ROOT_END_TAG}"));
    }

    #[test]
    fn wraps_each_part_in_order() {
        let mut stream = CompositeXmlStream::new(parts(&["<a/>", "<b>x</b>"]));
        let doc = read_all(&mut stream, 1024);
        assert_eq!(
            doc,
            "<agg:Root xmlns:agg=\"urn:sluice:aggregate\">\
             <agg:Part_0><a/></agg:Part_0>\
             <agg:Part_1><b>x</b></agg:Part_1>\
             </agg:Root>"
        );
    }

    #[test]
    fn chunk_size_does_not_change_output() {
        let fragments = ["<a/>", "<b attr=\"1\">long content here</b>", "<c/>"];
        let mut reference = CompositeXmlStream::new(parts(&fragments));
        let expected = read_all(&mut reference, 4096);

        for chunk in [1usize, 2, 3, 7, 16, 61, 4096] {
            let mut stream = CompositeXmlStream::new(parts(&fragments));
            assert_eq!(read_all(&mut stream, chunk), expected, "chunk size {chunk}");
        }
    }

    #[test]
    fn read_after_done_returns_zero() {
        let mut stream = CompositeXmlStream::new(parts(&["<a/>"]));
        read_all(&mut stream, 32);
        let mut buf = [0u8; 8];
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn length_counts_markup_and_parts() {
        let mut stream = CompositeXmlStream::new(parts(&["<a/>", "<bb/>"]));
        let expected = (ROOT_START_TAG.len()
            + ROOT_END_TAG.len()
            + part_start_tag(0).len()
            + part_end_tag(0).len()
            + part_start_tag(1).len()
            + part_end_tag(1).len()
            + 4
            + 5) as u64;
        assert_eq!(stream.byte_len().unwrap(), expected);
    }

    #[test]
    fn length_unsupported_with_lengthless_part() {
        let inner = ReaderStream::new(Cursor::new(b"<a/>".to_vec()));
        let mut stream = CompositeXmlStream::new(vec![Box::new(inner)]);
        assert!(matches!(
            stream.byte_len(),
            Err(SluiceError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn rewind_resets_everything_when_parts_are_seekable() {
        let mut stream = CompositeXmlStream::new(parts(&["<a/>", "<b/>"]));
        let expected = read_all(&mut stream, 4096);

        stream.rewind_to_start().unwrap();
        assert!(stream.at_start());
        assert_eq!(read_all(&mut stream, 5), expected);
    }

    #[test]
    fn rewind_fails_with_non_seekable_part() {
        let seekable = Box::new(Cursor::new(b"<a/>".to_vec())) as Box<dyn Stream>;
        let forward_only =
            Box::new(ReaderStream::new(Cursor::new(b"<b/>".to_vec()))) as Box<dyn Stream>;
        let mut stream = CompositeXmlStream::new(vec![seekable, forward_only]);
        read_all(&mut stream, 16);
        assert!(matches!(
            stream.rewind_to_start(),
            Err(SluiceError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn position_is_zero_only_before_reading() {
        let mut stream = CompositeXmlStream::new(parts(&["<a/>"]));
        assert_eq!(stream.position().unwrap(), 0);
        let mut buf = [0u8; 4];
        stream.read(&mut buf).unwrap();
        assert!(stream.position().is_err());
    }

    #[test]
    fn into_parts_only_at_start() {
        let stream = CompositeXmlStream::new(parts(&["<a/>", "<b/>"]));
        assert_eq!(stream.into_parts().unwrap().len(), 2);

        let mut consumed = CompositeXmlStream::new(parts(&["<a/>"]));
        let mut buf = [0u8; 2];
        consumed.read(&mut buf).unwrap();
        assert!(consumed.into_parts().is_err());
    }
}
