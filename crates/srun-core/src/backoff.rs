//! Retry schedule for login attempts
//!
//! [`BackoffPolicy`] is a strategy object: it owns the schedule parameters
//! and is handed the operation to retry together with a cancellation token.
//!
//! ```text
//! attempt 1 ──✗── wait initial ──► attempt 2 ──✗── wait initial×factor ──► ...
//!                                               (capped at max_delay)
//! ```

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::BackoffConfig;
use crate::error::{Error, Result};

/// Exponential retry schedule
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts including the first; 0 retries until cancelled
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
}

impl BackoffPolicy {
    /// Create a policy
    ///
    /// # Parameters
    ///
    /// - `max_attempts`: Total attempts including the first; 0 means unlimited
    /// - `initial_delay`: Wait before the second attempt
    /// - `max_delay`: Upper bound for any single wait
    /// - `factor`: Multiplier applied after each failure (values below 1 are treated as 1)
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts,
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            factor: if factor.is_finite() { factor.max(1.0) } else { 1.0 },
        }
    }

    /// Build a policy from the `backoff` config section
    pub fn from_config(config: &BackoffConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_secs(config.initial_secs),
            Duration::from_secs(config.max_secs),
            config.exponent_factor,
        )
    }

    /// Maximum number of attempts (0 = unlimited)
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.factor.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(scaled)
    }

    /// Run `operation` until it succeeds, the policy is exhausted, or
    /// `cancel` fires
    ///
    /// The operation receives the 1-based attempt number. Errors that are
    /// not retryable (see [`Error::is_retryable`]) end the run immediately.
    ///
    /// # Returns
    ///
    /// - `Ok(T)`: The first successful result
    /// - `Err(e)`: The last error once attempts are exhausted
    /// - `Err(Error::Cancelled)`: Cancelled before or between attempts
    pub async fn run<F, Fut, T>(&self, mut operation: F, cancel: &CancellationToken) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            attempt = attempt.saturating_add(1);
            let error = match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(attempt, "Not retrying: {}", error);
                return Err(error);
            }

            if self.max_attempts != 0 && attempt >= self.max_attempts {
                warn!(attempt, "Giving up after {} attempt(s): {}", attempt, error);
                return Err(error);
            }

            let delay = self.delay_for(attempt);
            warn!(attempt, ?delay, "Attempt failed, retrying: {}", error);

            tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(Error::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default())
    }
}
