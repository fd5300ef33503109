//! Reconnection policy for a channel session's live connection.
//!
//! The policy is deliberately simple: a fixed delay between attempts, no
//! attempt limit and no backoff growth. It lives as long as the session,
//! across every connection the session opens, so the attempt counter keeps
//! counting until a connection succeeds.

use std::time::Duration;

/// Delay between a connection closing and the next attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Fixed-delay, unbounded retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Creates a policy that waits `delay` before every retry.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay, attempts: 0 }
    }

    /// Called when the connection closed: records one more attempt and
    /// returns how long to wait before it.
    pub const fn next_delay(&mut self) -> Duration {
        self.attempts = self.attempts.saturating_add(1);
        self.delay
    }

    /// Called when a connection is established.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Consecutive retries since the last successful connection.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// The configured delay.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }
}
