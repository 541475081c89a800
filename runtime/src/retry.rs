//! Retry logic with exponential backoff for handling transient failures.
//!
//! The same [`RetryPolicy`] drives two things:
//!
//! - the redelivery budget of an [`EventConsumer`](crate::consumer::EventConsumer):
//!   a message whose handler fails transiently is requeued with
//!   [`RetryPolicy::delay_for_attempt`] until [`RetryPolicy::should_retry`] says stop
//! - [`retry_with_backoff`], used for startup connections
//!
//! # Example
//!
//! ```rust
//! use fulfillment_runtime::retry::{RetryPolicy, retry_with_backoff};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::builder()
//!     .max_retries(5)
//!     .initial_delay(Duration::from_millis(100))
//!     .max_delay(Duration::from_secs(10))
//!     .multiplier(2.0)
//!     .build();
//!
//! let result = retry_with_backoff(policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 5
/// - `initial_delay`: 500ms
/// - `max_delay`: 30 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt
    pub max_retries: u32,
    /// Initial delay before first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Calculate delay before retry number `retry` (0-based).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier ^ retry`, capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        if retry == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        #[allow(clippy::cast_precision_loss)]
        let initial_ms = self.initial_delay.as_millis() as f64;
        #[allow(clippy::cast_possible_wrap)]
        let delay_ms = initial_ms * self.multiplier.powi(retry.min(64) as i32);

        #[allow(clippy::cast_precision_loss)]
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        Duration::from_millis(delay_ms as u64)
    }

    /// Whether a message on its `delivery`-th delivery (1-based) may be redelivered.
    #[must_use]
    pub const fn should_retry(&self, delivery: u32) -> bool {
        delivery <= self.max_retries
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<u32>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(5),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(500)),
            max_delay: self.max_delay.unwrap_or(Duration::from_secs(30)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Retry an async operation with exponential backoff.
///
/// Returns `Ok(T)` if the operation succeeds within the retry limit,
/// or the last error once all retries are exhausted.
///
/// # Errors
///
/// Returns the error of the final attempt.
///
/// # Example
///
/// ```rust
/// use fulfillment_runtime::retry::{RetryPolicy, retry_with_backoff};
///
/// # async fn example() -> Result<(), String> {
/// let result = retry_with_backoff(RetryPolicy::default(), || async {
///     Ok::<_, String>(42)
/// }).await?;
///
/// assert_eq!(result, 42);
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(policy: RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut retry = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if retry > 0 {
                    tracing::info!(retry, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) => {
                if retry >= policy.max_retries {
                    tracing::error!(retry, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(retry);
                tracing::warn!(
                    retry,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying..."
                );

                sleep(delay).await;
                retry += 1;
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delays_grow_exponentially_and_cap() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(1000))
            .multiplier(2.0)
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(1000));
    }

    #[test]
    fn redelivery_budget_counts_deliveries() {
        let policy = RetryPolicy::builder().max_retries(2).build();
        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));

        let never = RetryPolicy::builder().max_retries(0).build();
        assert!(!never.should_retry(1));
    }

    #[tokio::test]
    async fn retry_with_backoff_succeeds_after_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::builder()
            .max_retries(3)
            .initial_delay(Duration::from_millis(1))
            .build();

        let counter = Arc::clone(&calls);
        let result = retry_with_backoff(policy, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_with_backoff_returns_last_error() {
        let policy = RetryPolicy::builder()
            .max_retries(1)
            .initial_delay(Duration::from_millis(1))
            .build();
        let result: Result<(), String> =
            retry_with_backoff(policy, || async { Err("down".to_string()) }).await;
        assert_eq!(result.unwrap_err(), "down");
    }
}
