//! Read stream that raises a terminal notification on exhaustion
//!
//! The notification fires when a read call first observes zero bytes from the
//! source, not when the caller happens to stop reading: a consumer may stop
//! short of the final zero-byte read, in which case the source was never
//! proven exhausted and the event must not fire.

use crate::error::{Result, SluiceError};
use crate::io::Stream;
use std::io::{self, Read};

/// Callback invoked once with the total number of bytes the source yielded.
pub type AfterLastReadFn = Box<dyn FnMut(u64)>;

/// Wraps a source and fires a notification exactly once at end-of-stream.
pub struct EventingReadStream<S: Read> {
    source: S,
    bytes_read: u64,
    exhausted: bool,
    after_last_read: Option<AfterLastReadFn>,
}

impl<S: Read> EventingReadStream<S> {
    /// Wrap `source`.
    pub fn new(source: S) -> Self {
        Self {
            source,
            bytes_read: 0,
            exhausted: false,
            after_last_read: None,
        }
    }

    /// Register the callback fired once when end-of-stream is first observed.
    pub fn set_after_last_read(&mut self, callback: AfterLastReadFn) {
        self.after_last_read = Some(callback);
    }

    /// Whether end-of-stream has been observed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

impl<S: Read> Read for EventingReadStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.source.read(buf)?;
        if n == 0 && !buf.is_empty() && !self.exhausted {
            self.exhausted = true;
            if let Some(callback) = self.after_last_read.as_mut() {
                callback(self.bytes_read);
            }
        }
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<S: Read> Stream for EventingReadStream<S> {
    /// Length is only known once the source has been proven exhausted.
    fn byte_len(&mut self) -> Result<u64> {
        if self.exhausted {
            Ok(self.bytes_read)
        } else {
            Err(SluiceError::UnsupportedOperation(
                "length before exhaustion",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    #[test]
    fn fires_exactly_once_at_first_zero_byte_read() {
        let fired = Rc::new(Cell::new(0u32));
        let seen_len = Rc::new(Cell::new(0u64));

        let mut stream = EventingReadStream::new(Cursor::new(b"abc".to_vec()));
        let fired_clone = Rc::clone(&fired);
        let len_clone = Rc::clone(&seen_len);
        stream.set_after_last_read(Box::new(move |len| {
            fired_clone.set(fired_clone.get() + 1);
            len_clone.set(len);
        }));

        let mut scratch = [0u8; 2];
        assert_eq!(stream.read(&mut scratch).unwrap(), 2);
        assert_eq!(fired.get(), 0);
        assert_eq!(stream.read(&mut scratch).unwrap(), 1);
        assert_eq!(fired.get(), 0);
        assert_eq!(stream.read(&mut scratch).unwrap(), 0);
        assert_eq!(fired.get(), 1);
        assert_eq!(seen_len.get(), 3);

        // further reads do not re-fire
        assert_eq!(stream.read(&mut scratch).unwrap(), 0);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn does_not_fire_if_caller_stops_short() {
        let fired = Rc::new(Cell::new(false));
        let mut stream = EventingReadStream::new(Cursor::new(b"abc".to_vec()));
        let fired_clone = Rc::clone(&fired);
        stream.set_after_last_read(Box::new(move |_| fired_clone.set(true)));

        let mut scratch = [0u8; 3];
        assert_eq!(stream.read(&mut scratch).unwrap(), 3);
        // logical end consumed but never read past it
        assert!(!fired.get());
        assert!(!stream.is_exhausted());
    }

    #[test]
    fn length_gated_on_exhaustion() {
        let mut stream = EventingReadStream::new(Cursor::new(b"abcd".to_vec()));
        assert!(stream.byte_len().is_err());
        stream.drain().unwrap();
        assert_eq!(stream.byte_len().unwrap(), 4);
    }
}
