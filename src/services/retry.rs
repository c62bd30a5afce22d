//! Exponential-backoff executor for idempotent outbound operations.

use std::{fmt, future::Future, time::Duration};

/// Retry configuration shared by every outbound call.
///
/// Every failure is retried the same way until `max_attempts` is reached;
/// the delay grows by `backoff_multiplier` after each sleep and is capped at
/// `max_delay`. There is no jitter. `should_retry_errors = false` turns the
/// executor into a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
    pub should_retry_errors: bool,
}

impl RetryPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_millis(2000);
    pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_millis(60_000);

    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            initial_delay: Self::DEFAULT_INITIAL_DELAY,
            backoff_multiplier: Self::DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: Self::DEFAULT_MAX_DELAY,
            should_retry_errors: true,
        }
    }

    /// Single attempt, no sleeping.
    #[must_use]
    pub const fn disabled() -> Self {
        Self::new().with_max_attempts(1).with_retry_errors(false)
    }

    /// # Panics
    ///
    /// Panics if `max_attempts` is 0.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        assert!(max_attempts >= 1, "max_attempts must be at least 1");
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// # Panics
    ///
    /// Panics if `multiplier` is not positive.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        assert!(multiplier > 0.0, "backoff_multiplier must be positive");
        self.backoff_multiplier = multiplier;
        self
    }

    #[must_use]
    pub const fn with_retry_errors(mut self, enabled: bool) -> Self {
        self.should_retry_errors = enabled;
        self
    }

    /// Delay to use after `current`: `min(current * multiplier, max_delay)`.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds or the policy gives up.
    ///
    /// The last error is returned; earlier ones are only logged. Sleeping
    /// suspends the calling task only.
    pub async fn execute<T, E, F, Fut>(&self, context: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut delay = self.initial_delay;
        let mut attempt: u32 = 1;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if attempt >= self.max_attempts || !self.should_retry_errors {
                        tracing::error!(context, attempt, error = %error, "operation failed after {attempt} attempt(s)");
                        return Err(error);
                    }

                    tracing::warn!(
                        context,
                        attempt,
                        max_attempts = self.max_attempts,
                        next_delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "operation failed, retrying"
                    );

                    tokio::time::sleep(delay).await;
                    delay = self.next_delay(delay);
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
