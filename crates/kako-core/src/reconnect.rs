//! Reconnection backoff policy.

use std::time::Duration;

/// Maps a reconnect attempt number to the delay before that attempt.
///
/// Attempt `n` (1-based) waits `base * 2^(n-1)`. Once `n` exceeds
/// `max_attempts` the policy returns `None`, which the connection treats as
/// "give up and report a permanent disconnect".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Delay before reconnect attempt `attempt`, or `None` to give up.
    ///
    /// Attempt 0 is the initial, user-requested connect and is never delayed.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 {
            return Some(Duration::ZERO);
        }
        if attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }

    /// Whether attempt `attempt` would still be scheduled.
    pub fn allows(&self, attempt: u32) -> bool {
        self.delay_for(attempt).is_some()
    }
}
