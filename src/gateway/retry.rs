//! Bounded exponential backoff for table store calls.
//!
//! Transient failures (network, 429, 5xx) are retried up to `max_retries`
//! times. A 429 with a `Retry-After` hint waits for the hint instead of the
//! computed backoff, capped at `max_backoff_ms`. Anything else returns at once.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{GatewayError, GatewayFailure};

/// Retry settings, read from the `execution` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay in milliseconds
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom max retries
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Disable retries
    pub fn disabled() -> Self {
        Self::new(0)
    }

    /// Set initial backoff
    pub fn with_initial_backoff(mut self, ms: u64) -> Self {
        self.initial_backoff_ms = ms;
        self
    }

    /// Set max backoff
    pub fn with_max_backoff(mut self, ms: u64) -> Self {
        self.max_backoff_ms = ms;
        self
    }

    /// Total attempts including the first one
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let base = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry as i32 - 1);
        let capped = base.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }

    /// Delay to use after `error` on retry number `retry`
    fn delay_for(&self, error: &GatewayError, retry: u32) -> Duration {
        let cap = Duration::from_millis(self.max_backoff_ms);
        match error {
            GatewayError::RateLimited {
                retry_after: Some(hint),
            } => (*hint).min(cap),
            _ => self.backoff_for(retry),
        }
    }
}

/// Parse a `Retry-After` header given in seconds.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Run `call` until it succeeds, fails non-transiently, or the budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, GatewayFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 0;

    loop {
        attempt += 1;
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    log::info!("{} succeeded on attempt {}/{}", operation, attempt, max_attempts);
                }
                return Ok(value);
            }
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let wait = policy.delay_for(&error, attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {}ms",
                    operation,
                    attempt,
                    max_attempts,
                    error,
                    wait.as_millis()
                );
                tokio::time::sleep(wait).await;
            }
            Err(error) => {
                if error.is_transient() {
                    log::error!("{} gave up after {} attempts: {}", operation, attempt, error);
                } else {
                    log::error!("{} failed with non-retryable error: {}", operation, error);
                }
                return Err(GatewayFailure { attempts: attempt, error });
            }
        }
    }
}
