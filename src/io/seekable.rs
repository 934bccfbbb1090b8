//! Adapts a forward-only source into a random-access read stream
//!
//! Archive readers need to seek to the central directory at the end of the
//! payload, but transport streams are usually forward-only. This adapter
//! buffers consumed source bytes in a [`SpillBuffer`] so earlier positions can
//! be revisited; seeking relative to the end drains the source first.

use crate::error::Result;
use crate::io::{SpillBuffer, Stream};
use std::io::{self, Read, Seek, SeekFrom, Write};

const FILL_CHUNK: usize = 8 * 1024;

/// Read/seek view over a forward-only source, backed by a spill buffer.
pub struct SeekableReadStream<R: Read> {
    source: R,
    buffer: SpillBuffer,
    pos: u64,
    source_exhausted: bool,
}

impl<R: Read> SeekableReadStream<R> {
    /// Wrap `source` with the default spill threshold.
    pub fn new(source: R) -> Self {
        Self::with_buffer(source, SpillBuffer::new())
    }

    /// Wrap `source`, buffering into the supplied spill buffer.
    pub fn with_buffer(source: R, buffer: SpillBuffer) -> Self {
        Self {
            source,
            buffer,
            pos: 0,
            source_exhausted: false,
        }
    }

    /// Pull source bytes into the buffer until it holds `target` bytes or the
    /// source ends. `u64::MAX` drains the source completely.
    fn fill_to(&mut self, target: u64) -> io::Result<()> {
        let mut chunk = [0u8; FILL_CHUNK];
        while !self.source_exhausted && self.buffer.len() < target {
            let n = self.source.read(&mut chunk)?;
            if n == 0 {
                self.source_exhausted = true;
                break;
            }
            let end = self.buffer.len();
            self.buffer.seek(SeekFrom::Start(end))?;
            self.buffer.write_all(&chunk[..n])?;
        }
        Ok(())
    }

    /// Read the remaining source to its true end, buffering everything.
    pub fn drain_source(&mut self) -> io::Result<()> {
        self.fill_to(u64::MAX)
    }

    /// Current read position.
    pub fn position(&self) -> u64 {
        self.pos
    }
}

impl<R: Read> Read for SeekableReadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.fill_to(self.pos + buf.len() as u64)?;
        self.buffer.seek(SeekFrom::Start(self.pos))?;
        let n = self.buffer.read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read> Seek for SeekableReadStream<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
            SeekFrom::End(offset) => {
                self.drain_source()?;
                self.buffer.len() as i64 + offset
            }
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl<R: Read> Stream for SeekableReadStream<R> {
    fn byte_len(&mut self) -> Result<u64> {
        self.drain_source()?;
        Ok(self.buffer.len())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn rewind_to_start(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}
