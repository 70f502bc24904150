use crate::config::{FetchConfig, MAX_FETCH_ATTEMPTS};
use crate::crawler::RandomSource;
use std::time::Duration;

/// Exponential backoff with jitter
///
/// The delay before attempt `n + 1` is `base * 2^(n - 1)`, capped at `max_delay`, then
/// scaled by a jitter factor drawn uniformly from [0.75, 1.25).
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.clamp(1, MAX_FETCH_ATTEMPTS),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Delay before the next try, without jitter
    ///
    /// # Arguments
    ///
    /// * `attempt` - The 1-based attempt that just failed
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let factor = 1u32 << exponent;
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before the next try, with jitter from `rng`
    pub fn delay_for(&self, attempt: u32, rng: &dyn RandomSource) -> Duration {
        let jitter = 0.75 + rng.next_f64() * 0.5;
        self.base_delay_for(attempt).mul_f64(jitter)
    }

    /// Returns true if another attempt is allowed after `attempt` failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::FixedRandom;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(1_000))
    }

    #[test]
    fn test_delays_double() {
        let p = policy();
        assert_eq!(p.base_delay_for(1), Duration::from_millis(100));
        assert_eq!(p.base_delay_for(2), Duration::from_millis(200));
        assert_eq!(p.base_delay_for(3), Duration::from_millis(400));
        assert_eq!(p.base_delay_for(4), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_capped() {
        let p = policy();
        assert_eq!(p.base_delay_for(5), Duration::from_millis(1_000));
        assert_eq!(p.base_delay_for(40), Duration::from_millis(1_000));
    }

    #[test]
    fn test_jitter_range() {
        let p = policy();
        assert_eq!(
            p.delay_for(2, &FixedRandom(0.5)),
            Duration::from_millis(200)
        );
        let low = p.delay_for(2, &FixedRandom(0.0));
        assert!(low.as_micros().abs_diff(150_000) <= 1);
        assert!(p.delay_for(2, &FixedRandom(0.999)) < Duration::from_millis(250));
    }

    #[test]
    fn test_should_retry() {
        let p = policy();
        assert!(p.should_retry(4));
        assert!(!p.should_retry(5));
    }

    #[test]
    fn test_zero_attempts_becomes_one() {
        let p = RetryPolicy::new(0, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts, 1);
        assert!(!p.should_retry(1));
    }

    #[test]
    fn test_attempts_clamped_to_ceiling() {
        let p = RetryPolicy::new(50, Duration::from_millis(1), Duration::from_millis(1));
        assert_eq!(p.max_attempts, MAX_FETCH_ATTEMPTS);
        assert!(p.should_retry(4));
        assert!(!p.should_retry(5));
        assert!(!p.should_retry(10));
    }
}
