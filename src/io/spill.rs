//! Memory buffer that spills to a temporary file past a size threshold
//!
//! Small payloads stay in memory; once the threshold is crossed the content
//! moves to an unlinked temporary file so arbitrarily large payloads never
//! exhaust memory. The file is deleted when the buffer is dropped.

use crate::error::Result;
use crate::io::{Sink, Stream};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Default threshold after which content moves to disk (1 MB).
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

enum Backing {
    Memory(Vec<u8>),
    Disk(std::fs::File),
}

/// Seekable read/write buffer, in-memory up to a threshold, file-backed beyond.
pub struct SpillBuffer {
    backing: Backing,
    threshold: usize,
    pos: u64,
    len: u64,
}

impl SpillBuffer {
    /// Create a buffer with the default spill threshold.
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_SPILL_THRESHOLD)
    }

    /// Create a buffer that moves to disk once `threshold` bytes are held.
    pub fn with_threshold(threshold: usize) -> Self {
        Self {
            backing: Backing::Memory(Vec::new()),
            threshold,
            pos: 0,
            len: 0,
        }
    }

    /// Total bytes held.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the content has spilled to a temporary file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.backing, Backing::Disk(_))
    }

    fn spill_to_disk(&mut self, incoming: usize) -> io::Result<()> {
        let Backing::Memory(bytes) = &mut self.backing else {
            return Ok(());
        };
        if bytes.len() + incoming <= self.threshold {
            return Ok(());
        }
        log::debug!(
            "spill buffer exceeding {} bytes, moving {} bytes to disk",
            self.threshold,
            bytes.len()
        );
        let mut file = tempfile::tempfile()?;
        file.write_all(bytes)?;
        self.backing = Backing::Disk(file);
        Ok(())
    }
}

impl Default for SpillBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for SpillBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = match &mut self.backing {
            Backing::Memory(bytes) => {
                let start = (self.pos.min(bytes.len() as u64)) as usize;
                let n = (bytes.len() - start).min(buf.len());
                buf[..n].copy_from_slice(&bytes[start..start + n]);
                n
            }
            Backing::Disk(file) => {
                file.seek(SeekFrom::Start(self.pos))?;
                file.read(buf)?
            }
        };
        self.pos += n as u64;
        Ok(n)
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.spill_to_disk(buf.len())?;
        match &mut self.backing {
            Backing::Memory(bytes) => {
                let start = self.pos as usize;
                if start > bytes.len() {
                    bytes.resize(start, 0);
                }
                let overlap = (bytes.len() - start).min(buf.len());
                bytes[start..start + overlap].copy_from_slice(&buf[..overlap]);
                bytes.extend_from_slice(&buf[overlap..]);
            }
            Backing::Disk(file) => {
                file.seek(SeekFrom::Start(self.pos))?;
                file.write_all(buf)?;
            }
        }
        self.pos += buf.len() as u64;
        self.len = self.len.max(self.pos);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.backing {
            Backing::Memory(_) => Ok(()),
            Backing::Disk(file) => file.flush(),
        }
    }
}

impl Seek for SpillBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => self.len as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of spill buffer",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl Stream for SpillBuffer {
    fn byte_len(&mut self) -> Result<u64> {
        Ok(self.len)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn rewind_to_start(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }
}

impl Sink for SpillBuffer {
    fn commit(&mut self) -> Result<()> {
        self.flush()?;
        Ok(())
    }
}
