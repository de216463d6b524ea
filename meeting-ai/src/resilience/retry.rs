//! Exponential backoff retry policy.

use rand::Rng;
use std::time::Duration;

use crate::Error;

/// Outcome of consulting a [`RetryPolicy`] after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { after: Duration },
    DoNotRetry,
}

/// Exponential backoff retry policy.
///
/// Retries only retryable errors, waiting `base_delay * multiplier^n` plus up to
/// `jitter` of random spread, capped at `max_delay`. A rate-limit error's own
/// retry-after hint replaces the computed delay (still capped).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy with default settings.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Maximum number of retry attempts after the first call
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0)
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate exponential backoff delay, before jitter.
    fn exponential_delay(&self, n_past_retries: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.multiplier.powi(n_past_retries as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()).max(0.0))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        let spread = self.jitter.as_millis() as u64;
        let jitter = if spread == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
        };
        (delay + jitter).min(self.max_delay)
    }

    /// Decide whether to retry after `error`, given how many retries already ran.
    pub fn should_retry(&self, n_past_retries: u32, error: &Error) -> RetryDecision {
        if n_past_retries >= self.max_retries || !error.is_retryable() {
            return RetryDecision::DoNotRetry;
        }

        let after = match error.retry_after() {
            Some(hint) => hint.min(self.max_delay),
            None => self.jittered(self.exponential_delay(n_past_retries)),
        };
        RetryDecision::Retry { after }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}
