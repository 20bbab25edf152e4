//! Retransmission timing.
//!
//! RUDP uses a fixed per-attempt timeout with a bounded number of attempts;
//! there is no RTT estimation and no back-off.  A corrupted or lost packet
//! therefore costs exactly one [`RetryPolicy::timeout`] before it is resent.

use std::time::Duration;

/// Maximum transmissions of one packet before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// How long to wait for an acknowledgment after each transmission.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_micros(15_530);

/// Bounded-retry parameters shared by handshake, data transfer and teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total transmissions allowed, including the first one.
    pub max_attempts: u32,
    /// Wait for an acknowledgment after each transmission.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, timeout: Duration) -> Self {
        Self {
            max_attempts,
            timeout,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Longest time an exchange can block before giving up.
    pub fn worst_case(&self) -> Duration {
        self.timeout * self.max_attempts
    }
}
