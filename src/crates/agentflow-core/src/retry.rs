//! Retry policy - exponential backoff with jitter for retryable node errors
//!
//! The coordinator consults the run's [`RetryPolicy`] whenever a node fails
//! with a retryable error (`Timeout`, `Transient`); permanent errors
//! (`InvalidInput`, `Fatal`) are never retried. Backoff grows exponentially
//! per attempt, capped at a maximum interval, with optional random jitter to
//! avoid synchronized retry bursts against a shared downstream service.
//!
//! ```rust
//! use agentflow_core::retry::RetryPolicy;
//!
//! // 5 attempts: 1s, 3s, 9s, 27s between them (before jitter)
//! let policy = RetryPolicy::new(5)
//!     .with_initial_interval(1.0)
//!     .with_backoff_factor(3.0)
//!     .with_max_interval(60.0);
//!
//! assert!(policy.should_retry(1));
//! assert!(!policy.should_retry(5));
//! ```

use rand::Rng;
use std::time::Duration;

/// Configuration for retrying failed node executions
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: u32,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy with the given max attempts and default backoff
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 128.0,
            jitter: true,
        }
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(1)
    }

    /// Set the initial interval between retries
    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    /// Set the backoff factor
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Set the maximum interval between retries
    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before the retry following the given attempt (0-indexed)
    ///
    /// Exponential backoff `initial_interval * backoff_factor ^ attempt`,
    /// capped at `max_interval`, then scaled by a random factor in
    /// `0.5..=1.5` when jitter is enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt >= self.max_attempts {
            return Duration::from_secs(0);
        }

        let base = self.initial_interval * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_interval);
        let delayed = if self.jitter {
            capped * rand::thread_rng().gen_range(0.5..=1.5)
        } else {
            capped
        };
        Duration::from_secs_f64(delayed)
    }

    /// Whether another attempt is allowed after `attempts` have been made
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_interval, 0.5);
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.jitter);
    }

    #[test]
    fn test_should_retry_counts_attempts() {
        let policy = RetryPolicy::new(3);
        assert!(policy.should_retry(0));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        assert!(!RetryPolicy::none().should_retry(1));
    }

    #[test]
    fn test_exponential_backoff_without_jitter() {
        let policy = RetryPolicy::new(5)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(5.0)
            .with_jitter(false);

        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(2), Duration::from_secs(4));
        // capped at max_interval
        assert_eq!(policy.calculate_delay(3), Duration::from_secs(5));
        // past max_attempts
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(0));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy::new(3).with_initial_interval(1.0);
        for _ in 0..50 {
            let delay = policy.calculate_delay(0).as_secs_f64();
            assert!((0.5..=1.5).contains(&delay), "delay {delay} out of bounds");
        }
    }
}
