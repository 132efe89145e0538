//! Lifetime of one streamed response.

use super::display_buffer::DisplayBuffer;
use super::ids::StreamTarget;

/// Result of feeding a fragment into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fed {
    /// This was the first content frame of the session.
    pub first_token: bool,
    /// The drain was idle and has to be armed.
    pub arm_drain: bool,
}

/// State owned by one in-flight send.
#[derive(Debug)]
pub struct StreamSession {
    target: StreamTarget,
    buffer: DisplayBuffer,
    live: bool,
    connection_open: bool,
    first_token_seen: bool,
}

impl StreamSession {
    /// Start a session for `target`.
    #[must_use]
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            buffer: DisplayBuffer::new(),
            live: true,
            connection_open: true,
            first_token_seen: false,
        }
    }

    /// Routing key of this session.
    #[must_use]
    pub const fn target(&self) -> StreamTarget {
        self.target
    }

    /// Whether the session has not been cancelled.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        self.live
    }

    /// Whether more fragments may still arrive.
    #[must_use]
    pub const fn is_connection_open(&self) -> bool {
        self.connection_open
    }

    /// Whether characters are still queued for reveal.
    #[must_use]
    pub fn is_draining(&self) -> bool {
        self.live && self.buffer.is_draining()
    }

    /// Whether nothing more will ever be revealed.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        !self.live || (!self.connection_open && !self.buffer.is_draining())
    }

    /// Text revealed so far.
    #[must_use]
    pub fn revealed(&self) -> &str {
        self.buffer.revealed()
    }

    /// Queue a content fragment.
    ///
    /// Returns `None` once the connection is closed or the session cancelled.
    pub fn feed(&mut self, fragment: &str) -> Option<Fed> {
        if !self.live || !self.connection_open {
            return None;
        }
        let first_token = !self.first_token_seen;
        self.first_token_seen = true;
        let arm_drain = self.buffer.feed(fragment);
        Some(Fed {
            first_token,
            arm_drain,
        })
    }

    /// Reveal one character, returning the full revealed text.
    pub fn tick(&mut self) -> Option<&str> {
        if !self.live {
            return None;
        }
        self.buffer.tick()
    }

    /// Reveal everything queued at once.
    pub fn flush(&mut self) -> Option<&str> {
        if !self.live {
            return None;
        }
        self.buffer.flush()
    }

    /// Stop accepting fragments; queued characters keep draining.
    pub fn close_connection(&mut self) {
        self.connection_open = false;
    }

    /// Kill the session: nothing more is fed or revealed.
    pub fn cancel(&mut self) {
        self.live = false;
        self.connection_open = false;
        self.buffer.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ids::ConversationId;

    fn session() -> StreamSession {
        StreamSession::new(StreamTarget::fresh(ConversationId::new()))
    }

    #[test]
    fn test_first_token_flag_only_once() {
        let mut s = session();
        let first = s.feed("Hi").unwrap();
        assert!(first.first_token);
        assert!(first.arm_drain);
        let second = s.feed(" there").unwrap();
        assert!(!second.first_token);
        assert!(!second.arm_drain);
    }

    #[test]
    fn test_closed_session_drains_then_finishes() {
        let mut s = session();
        s.feed("ab");
        assert!(s.is_connection_open());
        s.close_connection();
        assert!(!s.is_connection_open());
        assert!(s.feed("c").is_none());
        assert!(!s.is_finished());
        assert_eq!(s.tick(), Some("a"));
        assert_eq!(s.tick(), Some("ab"));
        assert!(s.is_finished());
        assert_eq!(s.revealed(), "ab");
    }

    #[test]
    fn test_cancelled_session_stops_revealing() {
        let mut s = session();
        s.feed("abc");
        s.tick();
        s.cancel();
        assert!(s.is_finished());
        assert!(!s.is_draining());
        assert!(s.tick().is_none());
        assert!(s.feed("d").is_none());
        assert_eq!(s.revealed(), "a");
    }
}
