//! Minimum interval between user-initiated sends.

use std::time::Duration;

/// Cooldown gate keyed on millisecond timestamps.
#[derive(Debug, Clone)]
pub struct SendGate {
    cooldown_ms: i64,
    last_accepted_ms: Option<i64>,
}

impl SendGate {
    /// Create a gate with the given cooldown.
    #[must_use]
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown_ms: i64::try_from(cooldown.as_millis()).unwrap_or(i64::MAX),
            last_accepted_ms: None,
        }
    }

    /// Try to accept a send at `now_ms`.
    ///
    /// On acceptance the timestamp is recorded immediately, so a slow or
    /// failing send still consumes the window.
    pub fn try_acquire(&mut self, now_ms: i64) -> bool {
        if self.remaining_ms(now_ms) > 0 {
            return false;
        }
        self.last_accepted_ms = Some(now_ms);
        true
    }

    /// Milliseconds left before a send at `now_ms` would be accepted.
    #[must_use]
    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        let Some(last) = self.last_accepted_ms else {
            return 0;
        };
        let elapsed = now_ms.saturating_sub(last);
        u64::try_from(self.cooldown_ms.saturating_sub(elapsed)).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: i64 = 1_700_000_000_000;

    #[test]
    fn test_first_send_accepted() {
        let mut gate = SendGate::new(Duration::from_millis(3000));
        assert!(gate.try_acquire(START));
    }

    #[test]
    fn test_rejects_within_cooldown_then_accepts() {
        let mut gate = SendGate::new(Duration::from_millis(3000));
        assert!(gate.try_acquire(START));
        assert!(!gate.try_acquire(START + 1000));
        assert_eq!(gate.remaining_ms(START + 1000), 2000);
        assert!(!gate.try_acquire(START + 2999));
        assert!(gate.try_acquire(START + 3000));
    }

    #[test]
    fn test_rejection_does_not_extend_window() {
        let mut gate = SendGate::new(Duration::from_millis(3000));
        assert!(gate.try_acquire(START));
        assert!(!gate.try_acquire(START + 2500));
        assert!(gate.try_acquire(START + 3000));
    }

    #[test]
    fn test_zero_cooldown_always_accepts() {
        let mut gate = SendGate::new(Duration::ZERO);
        assert!(gate.try_acquire(START));
        assert!(gate.try_acquire(START));
    }
}
