//! Minimum-interval alert gate.

/// Stateless beyond a single timestamp: no history of declined attempts.
pub struct AlertThrottle {
    interval_secs: u64,
    last_notify: u64,
}

impl AlertThrottle {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            last_notify: 0,
        }
    }

    /// Returns true and advances the gate only when a full interval has
    /// elapsed since the last accepted alert; otherwise leaves state
    /// unchanged.
    pub fn allow(&mut self, now: u64) -> bool {
        if now.saturating_sub(self.last_notify) > self.interval_secs {
            self.last_notify = now;
            true
        } else {
            false
        }
    }

    /// Epoch seconds of the last accepted alert (0 before the first).
    pub fn last_notify(&self) -> u64 {
        self.last_notify
    }
}
