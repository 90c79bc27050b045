//! Bounded retry for operations that can lose a race.
//!
//! Checkout uses it for order-id collisions: each attempt draws a fresh id,
//! and only a unique violation on the order id is worth another attempt.
//!
//! # Example
//!
//! ```rust,ignore
//! use arena::retry::{RetryPolicy, retry_if};
//!
//! let policy = RetryPolicy::fixed(3, Duration::from_millis(100));
//! let payment = retry_if(
//!     &policy,
//!     |attempt| insert_with_fresh_order_id(attempt),
//!     |err: &StoreError| err.is_unique_violation_of(ORDER_ID_CONSTRAINT),
//! )
//! .await?;
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// How many times to try and how long to wait in between.
///
/// `max_attempts` counts the first call: a policy of 3 runs the operation
/// at most three times.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any delay
    pub max_delay: Duration,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Same delay before every retry.
    #[must_use]
    pub const fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay: delay,
            max_delay: delay,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let scaled = self
            .initial_delay
            .mul_f64(self.multiplier.powi(exponent).max(0.0).min(1e6));
        scaled.min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with an error `should_retry`
/// rejects, or the policy runs out of attempts.
///
/// The operation receives the 1-based attempt number. On exhaustion the
/// last error is returned.
///
/// # Errors
///
/// The operation's error, unchanged.
pub async fn retry_if<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if !should_retry(&err) => return Err(err),
            Err(err) if attempt >= policy.max_attempts => {
                tracing::error!(attempt, error = %err, "Operation failed after max attempts");
                return Err(err);
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
