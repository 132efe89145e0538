//! Throttled reveal of streamed assistant text.
//!
//! Fragments may arrive in bursts of any size; the buffer queues their
//! characters and hands them out one per tick so the reply appears to be
//! typed. It holds no timer itself: the driver arms one only while
//! [`DisplayBuffer::is_draining`] is true.

use std::collections::VecDeque;

/// FIFO queue of characters awaiting reveal plus the text revealed so far.
#[derive(Debug, Default, Clone)]
pub struct DisplayBuffer {
    pending: VecDeque<char>,
    revealed: String,
}

impl DisplayBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue every character of `fragment`.
    ///
    /// Returns `true` when the drain has to be (re)armed, i.e. the queue was
    /// empty and now holds characters. An empty fragment is a no-op.
    pub fn feed(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        let was_idle = self.pending.is_empty();
        self.pending.extend(fragment.chars());
        was_idle
    }

    /// Reveal exactly one queued character.
    ///
    /// Returns the full revealed text, or `None` if nothing was pending.
    pub fn tick(&mut self) -> Option<&str> {
        let next = self.pending.pop_front()?;
        self.revealed.push(next);
        Some(&self.revealed)
    }

    /// Reveal everything still queued at once.
    ///
    /// Returns the full revealed text, or `None` if nothing was pending.
    pub fn flush(&mut self) -> Option<&str> {
        if self.pending.is_empty() {
            return None;
        }
        self.revealed.extend(self.pending.drain(..));
        Some(&self.revealed)
    }

    /// Drop queued characters without revealing them.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Whether characters are waiting to be revealed.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of characters waiting to be revealed.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Text revealed so far.
    #[must_use]
    pub fn revealed(&self) -> &str {
        &self.revealed
    }
}
