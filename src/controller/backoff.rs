//! # Exponential Backoff
//!
//! Capped exponential backoff for retrying failed reconciliations.
//!
//! The delay for a resource depends only on how many times in a row it has
//! failed: `min(base * 2^failures, max)`. With the defaults (1s base, 5 minute
//! cap) the sequence is 1s, 2s, 4s, 8s, ..., 256s, 300s, 300s, ...
//!
//! ## Usage
//!
//! ```rust
//! use operator_runtime::controller::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let backoff = ExponentialBackoff::default();
//! assert_eq!(backoff.delay(0), Duration::from_secs(1));
//! assert_eq!(backoff.delay(3), Duration::from_secs(8));
//! assert_eq!(backoff.delay(20), Duration::from_secs(300));
//! ```

use crate::config::OperatorConfig;
use std::time::Duration;

/// Exponential backoff calculator
///
/// Stateless: the failure count lives in the retry table, which resets it to
/// zero after a successful reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay after the first failure
    base: Duration,
    /// Upper bound for any delay
    max: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::from_config(&OperatorConfig::default())
    }
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    #[must_use]
    pub fn from_config(config: &OperatorConfig) -> Self {
        Self::new(config.backoff_base_duration(), config.backoff_max_duration())
    }

    /// Delay before the next retry of a resource that has already failed
    /// `failures` times since its last success
    ///
    /// # Example
    ///
    /// ```
    /// use operator_runtime::controller::backoff::ExponentialBackoff;
    /// use std::time::Duration;
    ///
    /// let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));
    /// assert_eq!(backoff.delay(1), Duration::from_secs(2));
    /// assert_eq!(backoff.delay(10), Duration::from_secs(60));
    /// ```
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        2u32.checked_pow(failures)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let backoff = ExponentialBackoff::default();

        // 1s, 2s, 4s, ... capped at 5 minutes
        let expected = [1, 2, 4, 8, 16, 32, 64, 128, 256, 300, 300];
        for (failures, secs) in expected.iter().enumerate() {
            assert_eq!(
                backoff.delay(failures as u32),
                Duration::from_secs(*secs),
                "delay after {failures} failures"
            );
        }
    }

    #[test]
    fn test_exponential_backoff_does_not_overflow() {
        let backoff = ExponentialBackoff::default();
        assert_eq!(backoff.delay(31), Duration::from_secs(300));
        assert_eq!(backoff.delay(32), Duration::from_secs(300));
        assert_eq!(backoff.delay(u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn test_exponential_backoff_custom_bounds() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(100), Duration::from_secs(1));
        assert_eq!(backoff.delay(0), Duration::from_millis(100));
        assert_eq!(backoff.delay(2), Duration::from_millis(400));
        assert_eq!(backoff.delay(4), Duration::from_secs(1));
        assert_eq!(backoff.max(), Duration::from_secs(1));
    }

    #[test]
    fn test_exponential_backoff_from_config() {
        let config = OperatorConfig {
            backoff_base_ms: 500,
            backoff_max_ms: 2_000,
            ..Default::default()
        };
        let backoff = ExponentialBackoff::from_config(&config);
        assert_eq!(backoff.delay(0), Duration::from_millis(500));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(5), Duration::from_secs(2));
    }
}
