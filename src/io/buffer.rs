//! Buffer controller: reconciles variable-size production with fixed-size reads
//!
//! Every decorator produces bytes in units it does not control (a closing tag,
//! a compressed block, a transform's output chunk) while the caller dictates
//! the read size. The controller copies what fits into the caller's window and
//! parks the excess in a backlog that is drained first on the next call.
//! Invariant: bytes handed to callers across calls equal bytes produced, in
//! order; nothing is ever dropped.

use std::collections::VecDeque;
use std::io::Read;

/// FIFO queue of byte segments produced but not yet delivered to the caller.
///
/// Multiple queued segments are required because a single production step may
/// emit several chunks (e.g. a codec flushing block after block).
#[derive(Debug, Default)]
pub struct Backlog {
    segments: VecDeque<Vec<u8>>,
}

impl Backlog {
    /// Create an empty backlog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a segment behind any pending ones. Empty segments are ignored.
    pub fn push_segment(&mut self, segment: Vec<u8>) {
        if !segment.is_empty() {
            self.segments.push_back(segment);
        }
    }

    /// Total bytes pending delivery.
    pub fn pending(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    /// Whether no bytes are pending.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Discard all pending segments.
    pub fn clear(&mut self) {
        self.segments.clear();
    }
}

/// Copies produced bytes into a caller's destination window, overflowing into
/// a [`Backlog`].
///
/// The controller never blocks and never discards: whatever does not fit in
/// the window is pushed back onto the backlog for the next read call.
pub struct BufferController<'a> {
    window: &'a mut [u8],
    filled: usize,
}

impl<'a> BufferController<'a> {
    /// Create a controller over the caller's destination window.
    pub fn new(window: &'a mut [u8]) -> Self {
        Self { window, filled: 0 }
    }

    /// Remaining space in the window.
    pub fn availability(&self) -> usize {
        self.window.len() - self.filled
    }

    /// Bytes placed in the window so far.
    pub fn count(&self) -> usize {
        self.filled
    }

    /// Move as many backlog bytes as fit into the window, front first.
    pub fn drain_backlog(&mut self, backlog: &mut Backlog) {
        while self.availability() > 0 {
            let Some(front) = backlog.segments.front_mut() else {
                return;
            };
            let take = front.len().min(self.availability());
            self.window[self.filled..self.filled + take].copy_from_slice(&front[..take]);
            self.filled += take;
            if take == front.len() {
                backlog.segments.pop_front();
            } else {
                front.drain(..take);
            }
        }
    }

    /// Copy `bytes` into the window; whatever does not fit is queued on the
    /// backlog.
    pub fn append(&mut self, bytes: &[u8], backlog: &mut Backlog) {
        let take = bytes.len().min(self.availability());
        self.window[self.filled..self.filled + take].copy_from_slice(&bytes[..take]);
        self.filled += take;
        if take < bytes.len() {
            backlog.push_segment(bytes[take..].to_vec());
        }
    }

    /// Let `source` read directly into the remaining window, returning the
    /// number of bytes it produced (0 = source end).
    pub fn append_read<R: Read + ?Sized>(&mut self, source: &mut R) -> std::io::Result<usize> {
        let n = source.read(&mut self.window[self.filled..])?;
        self.filled += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fills_window_from_slice_and_overflows_to_backlog() {
        let mut window = [0u8; 4];
        let mut backlog = Backlog::new();
        let mut controller = BufferController::new(&mut window);

        controller.append(b"abcdef", &mut backlog);

        assert_eq!(controller.count(), 4);
        assert_eq!(controller.availability(), 0);
        assert_eq!(backlog.pending(), 2);
        assert_eq!(&window, b"abcd");
    }

    #[test]
    fn drains_backlog_before_new_production() {
        let mut backlog = Backlog::new();
        backlog.push_segment(b"xy".to_vec());
        backlog.push_segment(b"z".to_vec());

        let mut window = [0u8; 5];
        let mut controller = BufferController::new(&mut window);
        controller.drain_backlog(&mut backlog);
        controller.append(b"12", &mut backlog);

        assert_eq!(controller.count(), 5);
        assert!(backlog.is_empty());
        assert_eq!(&window, b"xyz12");
    }

    #[test]
    fn partial_backlog_segment_is_kept_in_order() {
        let mut backlog = Backlog::new();
        backlog.push_segment(b"abcdef".to_vec());

        let mut window = [0u8; 2];
        let mut controller = BufferController::new(&mut window);
        controller.drain_backlog(&mut backlog);
        assert_eq!(&window, b"ab");
        assert_eq!(backlog.pending(), 4);

        let mut window = [0u8; 10];
        let mut controller = BufferController::new(&mut window);
        controller.drain_backlog(&mut backlog);
        assert_eq!(controller.count(), 4);
        assert_eq!(&window[..4], b"cdef");
        assert!(backlog.is_empty());
    }

    #[test]
    fn append_read_pulls_straight_into_window() {
        let mut source = Cursor::new(b"hello".to_vec());
        let mut window = [0u8; 8];
        let mut controller = BufferController::new(&mut window);

        let n = controller.append_read(&mut source).unwrap();
        assert_eq!(n, 5);
        assert_eq!(controller.count(), 5);

        let n = controller.append_read(&mut source).unwrap();
        assert_eq!(n, 0);
        assert_eq!(&window[..5], b"hello");
    }

    #[test]
    fn empty_segments_are_not_queued() {
        let mut backlog = Backlog::new();
        backlog.push_segment(Vec::new());
        assert!(backlog.is_empty());
    }
}
