//! Read stream that replicates consumed bytes into a target sink
//!
//! Every byte returned to the caller is written to the target first, in
//! order. The target is committed exactly once, at the first observation of
//! source exhaustion; rewinding afterwards re-reads from the now fully
//! materialized target without re-committing. Dropping the stream before
//! exhaustion commits nothing and rolls nothing back.

use crate::error::{Result, SluiceError};
use crate::io::{Sink, Stream};
use std::io::{self, Read, Write};

/// Tees bytes read from `source` into `target` while they are consumed.
pub struct ReplicatingReadStream<S: Read, T: Stream + Sink> {
    source: S,
    target: T,
    replicated: u64,
    exhausted: bool,
    reading_target: bool,
}

impl<S: Read, T: Stream + Sink> ReplicatingReadStream<S, T> {
    /// Wrap `source`, replicating everything read from it into `target`.
    pub fn new(source: S, target: T) -> Self {
        Self {
            source,
            target,
            replicated: 0,
            exhausted: false,
            reading_target: false,
        }
    }

    /// Whether the source has been read to exhaustion (and the target
    /// committed).
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Consume the stream, returning the target sink.
    pub fn into_target(self) -> T {
        self.target
    }
}

impl<S: Read, T: Stream + Sink> Read for ReplicatingReadStream<S, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.reading_target {
            return self.target.read(buf);
        }
        let n = self.source.read(buf)?;
        if n > 0 {
            self.target.write_all(&buf[..n])?;
            self.replicated += n as u64;
        } else if !buf.is_empty() && !self.exhausted {
            self.target.commit().map_err(SluiceError::into_io)?;
            self.exhausted = true;
        }
        Ok(n)
    }
}

impl<S: Read, T: Stream + Sink> Stream for ReplicatingReadStream<S, T> {
    fn byte_len(&mut self) -> Result<u64> {
        if self.exhausted {
            Ok(self.replicated)
        } else {
            Err(SluiceError::UnsupportedOperation(
                "length before exhaustion",
            ))
        }
    }

    fn is_seekable(&self) -> bool {
        self.exhausted
    }

    /// Rewinding is delegated to the target once the source is exhausted;
    /// subsequent reads re-drain the replica.
    fn rewind_to_start(&mut self) -> Result<()> {
        if !self.exhausted {
            return Err(SluiceError::UnsupportedOperation(
                "seek before exhaustion",
            ));
        }
        self.target.rewind_to_start()?;
        self.reading_target = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SpillBuffer;
    use std::io::Cursor;

    /// spill-backed sink that counts commit invocations
    struct CountingSink {
        buffer: SpillBuffer,
        commits: u32,
    }

    impl CountingSink {
        fn new() -> Self {
            Self { buffer: SpillBuffer::new(), commits: 0 }
        }
    }

    impl Read for CountingSink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.buffer.read(buf)
        }
    }

    impl Write for CountingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.buffer.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.buffer.flush()
        }
    }

    impl Stream for CountingSink {
        fn byte_len(&mut self) -> Result<u64> {
            self.buffer.byte_len()
        }

        fn is_seekable(&self) -> bool {
            true
        }

        fn rewind_to_start(&mut self) -> Result<()> {
            self.buffer.rewind_to_start()
        }
    }

    impl Sink for CountingSink {
        fn commit(&mut self) -> Result<()> {
            self.commits += 1;
            Ok(())
        }
    }

    #[test]
    fn target_receives_exactly_the_bytes_read_in_order() {
        let mut stream =
            ReplicatingReadStream::new(Cursor::new(b"stream me".to_vec()), CountingSink::new());
        let mut content = Vec::new();
        stream.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"stream me");

        let mut target = stream.into_target();
        target.rewind_to_start().unwrap();
        let mut replica = Vec::new();
        target.read_to_end(&mut replica).unwrap();
        assert_eq!(replica, b"stream me");
    }

    #[test]
    fn commit_fires_exactly_once_on_exhaustion() {
        let mut stream =
            ReplicatingReadStream::new(Cursor::new(b"abc".to_vec()), CountingSink::new());
        stream.drain().unwrap();
        // extra zero-byte reads must not re-commit
        let mut scratch = [0u8; 4];
        stream.read(&mut scratch).unwrap();
        assert_eq!(stream.into_target().commits, 1);
    }

    #[test]
    fn commit_never_fires_without_exhaustion() {
        let mut stream =
            ReplicatingReadStream::new(Cursor::new(b"abcdef".to_vec()), CountingSink::new());
        let mut scratch = [0u8; 3];
        stream.read(&mut scratch).unwrap();
        assert_eq!(stream.into_target().commits, 0);
    }

    #[test]
    fn seek_and_length_unsupported_before_exhaustion() {
        let mut stream =
            ReplicatingReadStream::new(Cursor::new(b"abc".to_vec()), CountingSink::new());
        assert!(!stream.is_seekable());
        assert!(stream.byte_len().is_err());
        assert!(matches!(
            stream.rewind_to_start(),
            Err(SluiceError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn rewind_after_exhaustion_redrains_without_recommit() {
        let mut stream =
            ReplicatingReadStream::new(Cursor::new(b"payload".to_vec()), CountingSink::new());
        stream.drain().unwrap();
        assert_eq!(stream.byte_len().unwrap(), 7);

        stream.rewind_to_start().unwrap();
        let mut replay = Vec::new();
        stream.read_to_end(&mut replay).unwrap();
        assert_eq!(replay, b"payload");
        assert_eq!(stream.into_target().commits, 1);
    }
}
