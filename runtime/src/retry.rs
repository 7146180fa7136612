//! Bounded retry with exponential backoff.
//!
//! Allocation retries when the store's uniqueness check rejects an insert: the
//! next attempt re-reads the used numbers and draws again. The caller decides
//! which errors are retryable and what an exhausted budget becomes.
//!
//! # Example
//!
//! ```rust
//! use raffle_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .initial_delay(Duration::from_millis(5))
//!     .build();
//!
//! let result = retry_with_predicate(
//!     &policy,
//!     |_attempt| async { Ok::<_, String>(42) },
//!     |err: &String| err.contains("taken"),
//! )
//! .await;
//! assert_eq!(result.ok(), Some(42));
//! # }
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 3 (first try included)
/// - `initial_delay`: 5ms
/// - `max_delay`: 100ms
/// - `multiplier`: 2.0
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: usize,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Backoff multiplier
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
            max_attempts: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// Delay after the failed attempt with index `attempt` (0-based).
    ///
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            return self.max_delay;
        }
        Duration::from_millis(delay_ms as u64)
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set the total number of attempts (at least 1).
    #[must_use]
    pub const fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Set the delay before the second attempt.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set the backoff cap.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set the backoff multiplier.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.unwrap_or(3).max(1),
            initial_delay: self.initial_delay.unwrap_or(Duration::from_millis(5)),
            max_delay: self.max_delay.unwrap_or(Duration::from_millis(100)),
            multiplier: self.multiplier.unwrap_or(2.0),
        }
    }
}

/// Why a retried operation gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum RetryFailure<E> {
    /// A non-retryable error; returned as soon as it happened
    Fatal(E),
    /// Every attempt failed with a retryable error
    Exhausted {
        /// Attempts made
        attempts: usize,
        /// Error of the final attempt
        last: E,
    },
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up.
///
/// `operation` receives the 0-based attempt index.
///
/// # Errors
///
/// [`RetryFailure::Fatal`] for the first error `is_retryable` rejects,
/// [`RetryFailure::Exhausted`] when every attempt failed retryably.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: &RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) => {
                if !is_retryable(&err) {
                    return Err(RetryFailure::Fatal(err));
                }

                if attempt + 1 >= policy.max_attempts {
                    tracing::warn!(
                        attempts = attempt + 1,
                        error = %err,
                        "Operation failed after max attempts"
                    );
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt + 1,
                        last: err,
                    });
                }

                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast(attempts: usize) -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(attempts)
            .initial_delay(Duration::from_millis(1))
            .build()
    }

    #[test]
    fn delay_doubles_and_is_capped() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(10))
            .max_delay(Duration::from_millis(50))
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(40));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(50));
        assert_eq!(policy.delay_for_attempt(1000), Duration::from_millis(50));
    }

    #[test]
    fn zero_attempts_means_one() {
        assert_eq!(RetryPolicy::builder().max_attempts(0).build().max_attempts, 1);
    }

    #[tokio::test]
    async fn succeeds_after_retryable_failures() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let result = retry_with_predicate(
            &fast(3),
            move |attempt| {
                c.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("number taken on attempt {attempt}"))
                    } else {
                        Ok(7)
                    }
                }
            },
            |err: &String| err.contains("taken"),
        )
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts() {
        let result = retry_with_predicate(
            &fast(3),
            |_| async { Err::<i32, _>("taken") },
            |_: &&str| true,
        )
        .await;

        assert_eq!(
            result,
            Err(RetryFailure::Exhausted {
                attempts: 3,
                last: "taken"
            })
        );
    }

    #[tokio::test]
    async fn non_retryable_error_fails_immediately() {
        let counter = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&counter);

        let result = retry_with_predicate(
            &fast(5),
            move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                async { Err::<i32, _>("closed") }
            },
            |err: &&str| err.contains("taken"),
        )
        .await;

        assert_eq!(result, Err(RetryFailure::Fatal("closed")));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
