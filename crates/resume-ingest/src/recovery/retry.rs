//! Retry with exponential backoff.

use crate::error::{ParserError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Called before every re-attempt with the error that triggered it, the attempt
/// about to run (starting at 2) and the maximum number of attempts.
pub type RetryObserver = Arc<dyn Fn(&ParserError, u32, u32) + Send + Sync>;

/// Backoff schedule.
///
/// `max_attempts` counts every attempt including the first. The delay before
/// attempt `k` (k ≥ 2) is `min(base_delay * multiplier^(k-2), max_delay)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub base_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "duration_ms")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// Delay before running `attempt` (1-based). Zero for the first attempt.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(i32::MAX as u32) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let cap = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// Returns the value and the number of attempts used. Errors carry the attempt
/// count in their context.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, observer: Option<&RetryObserver>, mut operation: F) -> Result<(T, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, max_attempts, "Decode succeeded after retry");
                }
                return Ok((value, attempt));
            }
            Err(err) => {
                if !err.is_retryable() {
                    tracing::debug!(code = err.code(), attempt, "Error is not retryable");
                    return Err(err.with_attempts(attempt));
                }
                if attempt >= max_attempts {
                    tracing::warn!(code = err.code(), attempts = attempt, "Retry budget exhausted");
                    return Err(err.with_attempts(attempt));
                }

                let next = attempt + 1;
                let delay = policy.delay_before(next);
                tracing::warn!(
                    code = err.code(),
                    attempt = next,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after failure"
                );
                if let Some(observer) = observer {
                    observer(&err, next, max_attempts);
                }
                tokio::time::sleep(delay).await;
                attempt = next;
            }
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
