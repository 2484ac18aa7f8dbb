use std::convert::TryFrom;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Longest backoff a policy may configure: one day.
pub const MAX_BACKOFF_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum RetryStrategy {
    Fixed,
    Linear,
    Exponential,
}

/// Backoff parameters for retrying a failed delivery.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RetryPolicy {
    pub strategy: RetryStrategy,
    pub max_retries: u32,
    pub initial_backoff_ms: i64,
    pub max_backoff_ms: i64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> RetryPolicy {
        RetryPolicy {
            strategy: RetryStrategy::Exponential,
            max_retries: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `retry` (1-based), clamped to `max_backoff_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let initial = self.initial_backoff_ms as f64;

        let delay = match self.strategy {
            RetryStrategy::Fixed => initial,
            RetryStrategy::Linear => initial * f64::from(retry),
            RetryStrategy::Exponential => {
                let exponent = i32::try_from(retry - 1).unwrap_or(i32::MAX);
                initial * self.backoff_multiplier.powi(exponent)
            }
        };

        let clamped = delay.min(self.max_backoff_ms as f64).max(0.0);
        Duration::milliseconds(clamped as i64)
    }

    pub fn is_valid(&self) -> bool {
        self.initial_backoff_ms >= 0
            && self.initial_backoff_ms <= self.max_backoff_ms
            && self.max_backoff_ms <= MAX_BACKOFF_MS
            && self.backoff_multiplier.is_finite()
            && self.backoff_multiplier >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy {
            strategy,
            max_retries: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn fixed_backoff_never_grows() {
        let policy = policy(RetryStrategy::Fixed);

        assert_eq!(policy.delay_for(1), Duration::milliseconds(500));
        assert_eq!(policy.delay_for(4), Duration::milliseconds(500));
    }

    #[test]
    fn linear_backoff_scales_with_retry() {
        let policy = policy(RetryStrategy::Linear);

        assert_eq!(policy.delay_for(1), Duration::milliseconds(500));
        assert_eq!(policy.delay_for(3), Duration::milliseconds(1_500));
        assert_eq!(policy.delay_for(9), Duration::milliseconds(3_000));
    }

    #[test]
    fn exponential_backoff_doubles_until_clamped() {
        let policy = policy(RetryStrategy::Exponential);

        assert_eq!(policy.delay_for(1), Duration::milliseconds(500));
        assert_eq!(policy.delay_for(2), Duration::milliseconds(1_000));
        assert_eq!(policy.delay_for(3), Duration::milliseconds(2_000));
        assert_eq!(policy.delay_for(4), Duration::milliseconds(3_000));
        assert_eq!(policy.delay_for(40), Duration::milliseconds(3_000));
    }

    #[test]
    fn multiplier_below_one_is_invalid() {
        let mut policy = policy(RetryStrategy::Exponential);
        assert!(policy.is_valid());

        policy.backoff_multiplier = 0.5;

        assert!(!policy.is_valid());
    }

    #[test]
    fn backoff_beyond_a_day_is_invalid() {
        let policy = RetryPolicy {
            strategy: RetryStrategy::Fixed,
            max_retries: 3,
            initial_backoff_ms: i64::MAX / 2,
            max_backoff_ms: i64::MAX,
            backoff_multiplier: 1.0,
        };
        assert!(!policy.is_valid());

        let policy = RetryPolicy {
            initial_backoff_ms: MAX_BACKOFF_MS,
            max_backoff_ms: MAX_BACKOFF_MS,
            ..policy
        };
        assert!(policy.is_valid());
        assert_eq!(policy.delay_for(1), Duration::days(1));
    }
}
