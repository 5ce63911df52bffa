//! Retry strategies for transport reads.
//!
//! Reads against the hardware transport are retried a bounded number of times
//! with a fixed pause in between. There is deliberately no backoff.

use std::time::Duration;

pub trait RetryStrategy: Send + Sync {
    /// Number of attempts after the first one.
    fn retries(&self) -> u32;

    /// Pause before retry `attempt` (1-based).
    fn delay(&self, attempt: u32) -> Duration;
}

/// Retry up to `retries` times, sleeping `delay` between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    pub retries: u32,
    pub delay: Duration,
}

impl FixedDelay {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

impl RetryStrategy for FixedDelay {
    fn retries(&self) -> u32 {
        self.retries
    }

    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// Single attempt, no retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetry;

impl RetryStrategy for NoRetry {
    fn retries(&self) -> u32 {
        0
    }

    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_delay_is_constant() {
        let strategy = FixedDelay::new(3, Duration::from_millis(10));
        assert_eq!(strategy.retries(), 3);
        assert_eq!(strategy.delay(1), Duration::from_millis(10));
        assert_eq!(strategy.delay(3), Duration::from_millis(10));
    }

    #[test]
    fn test_no_retry() {
        assert_eq!(NoRetry.retries(), 0);
        assert_eq!(NoRetry.delay(1), Duration::ZERO);
    }
}
