//! Retry logic with backoff and optional jitter.
//!
//! Used for transient external failures, most prominently the scraper's
//! "listing not ready yet" responses which resolve after a short delay.

use crate::error::Error;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
///
/// Transient failures (connection refused, listing still warming up) return
/// `true`. Permanent failures (validation, not-found, auth) return `false`.
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            // Connection-level network errors are worth retrying; HTTP-level
            // failures already carry a response and are not.
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            // The scraper signals a cache warm-up with a transient status
            Error::Scraper(msg) => msg.contains("not ready"),
            // Per-call deadlines are the step's budget; do not stack retries
            Error::Timeout { .. } => false,
            _ => false,
        }
    }
}

/// Retry pacing policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Ceiling on the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Fixed-interval polling policy (no backoff, no jitter)
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_factor: 1.0,
            jitter: false,
        }
    }
}

/// Execute an async operation, retrying retryable failures per the policy
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> crate::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = crate::Result<T>>,
{
    let mut delay = policy.initial_delay;

    for attempt in 1.. {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && e.is_retryable() => {
                let sleep_for = if policy.jitter {
                    apply_jitter(delay)
                } else {
                    delay
                };
                tracing::debug!(
                    attempt,
                    delay_ms = sleep_for.as_millis() as u64,
                    error = %e,
                    "Retrying transient failure"
                );
                tokio::time::sleep(sleep_for).await;
                delay = delay.mul_f64(policy.backoff_factor).min(policy.max_delay);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("retry loop exits via return")
}

/// Add up to 25% random jitter to a delay
fn apply_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0..1.25);
    delay.mul_f64(factor)
}
