//! Retry backoff policy for the transport.

use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;

/// Exponential backoff with jitter, bounded by the configured cap.
///
/// Only transient failures reach this policy; semantic error codes are
/// rejected by the chain before a retry is ever scheduled.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Maximum number of network attempts per operation.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Delay before retry number `retry_index` (zero-based).
    ///
    /// The base doubles per retry from the initial delay; a random jitter of
    /// up to 25% of the base is added, and the result never exceeds the cap.
    #[must_use]
    pub fn backoff_delay(&self, retry_index: u32) -> Duration {
        let initial = self.config.initial_backoff.as_millis() as u64;
        let cap = self.config.max_backoff.as_millis() as u64;

        let base = initial
            .saturating_mul(1_u64 << retry_index.min(16))
            .min(cap);
        let jitter = rand::rng().random_range(0..=base / 4);

        Duration::from_millis(base.saturating_add(jitter).min(cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(RetryConfig::default())
    }

    #[test]
    fn test_delays_stay_within_bounds() {
        let policy = policy();
        for retry_index in 0..8 {
            for _ in 0..50 {
                let delay = policy.backoff_delay(retry_index);
                assert!(delay >= Duration::from_millis(300), "retry {retry_index}: {delay:?}");
                assert!(delay <= Duration::from_millis(3000), "retry {retry_index}: {delay:?}");
            }
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = policy();
        // Without jitter the bases are 300, 600, 1200, capped at 3000.
        assert!(policy.backoff_delay(1) >= Duration::from_millis(600));
        assert!(policy.backoff_delay(2) >= Duration::from_millis(1200));
        assert_eq!(policy.backoff_delay(5), Duration::from_millis(3000));
    }

    #[test]
    fn test_large_retry_index_does_not_overflow() {
        let policy = policy();
        assert_eq!(policy.backoff_delay(u32::MAX), Duration::from_millis(3000));
    }
}
