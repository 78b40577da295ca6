//! # Retry Policy Module
//!
//! Exponential backoff retry policy shared by the queue delivery outcome
//! bookkeeping in [`crate::queue_delivery`]. Mirrors the worker pool's own
//! retry policy in `hookrelay-service` so the two layers agree on timing
//! without depending on each other.

use rand::Rng;
use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Examples
///
/// ```rust
/// use hookrelay_api::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 5);
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts.
    pub max_attempts: u32,

    /// Initial delay before first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retries.
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0).
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays.
    pub use_jitter: bool,

    /// Jitter range as a fraction of the delay (default 0.25 = ±25%).
    pub jitter_percent: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy with jitter enabled at the default 25%.
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        max_delay: Duration,
        backoff_multiplier: f64,
    ) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter.
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set a custom jitter percentage, clamped to `[0.0, 1.0]`.
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Delay before the given (0-based) retry attempt:
    /// `initial * multiplier^attempt`, capped at `max_delay`, with jitter
    /// applied if enabled.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped_delay_secs = base_delay_secs.min(self.max_delay.as_secs_f64());

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs)
    }

    /// `true` if `attempt` has not yet exceeded `max_attempts`.
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let mut rng = rand::thread_rng();
        let jitter_range = delay_secs * jitter_percent;
        let jitter = rng.gen_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }

    /// Total delivery attempts including the initial try.
    pub fn total_attempts(&self) -> u32 {
        self.max_attempts + 1
    }
}

/// Tracks the current attempt number for a single event's delivery.
#[derive(Debug, Clone)]
pub struct RetryState {
    /// Current retry attempt (0-based).
    pub attempt: u32,

    /// Total attempts made so far, including the initial one.
    pub total_attempts: u32,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 0,
            total_attempts: 1,
        }
    }

    pub fn next_attempt(&mut self) {
        self.attempt += 1;
        self.total_attempts += 1;
    }

    pub fn is_first_retry(&self) -> bool {
        self.attempt == 0
    }

    pub fn get_delay(&self, policy: &RetryPolicy) -> Duration {
        policy.calculate_delay(self.attempt)
    }

    pub fn can_retry(&self, policy: &RetryPolicy) -> bool {
        policy.should_retry(self.attempt)
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
