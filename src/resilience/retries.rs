//! Retry logic.
//!
//! # Responsibilities
//! - Run an operation up to `max_attempts` times
//! - Wait out the fixed backoff schedule between attempts
//! - Report each retry so callers can count it
//!
//! # Design Decisions
//! - Delays come from a literal schedule, never randomized
//! - The backoff delay is the only suspension point; the operation itself is not timed out
//! - Retry bookkeeping belongs to the caller; this loop only sequences attempts

use std::fmt;
use std::future::Future;

use crate::config::RetryConfig;
use crate::resilience::backoff::BackoffSchedule;

/// How many times to call, and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total calls allowed, first call included. Zero behaves like one.
    pub max_attempts: u32,
    pub backoff: BackoffSchedule,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: BackoffSchedule) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            BackoffSchedule::from_millis(&config.backoff_ms),
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, BackoffSchedule::default())
    }
}

/// Final result of a retried operation.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    /// First success, or the error from the last attempt.
    pub result: Result<T, E>,
    /// Number of times the operation was invoked.
    pub attempts: u32,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Call `operation` until it succeeds or the policy is exhausted.
///
/// `operation` receives the zero-based attempt index. `on_retry` runs once
/// per retry, after its backoff delay and before the next call, with the
/// one-based retry number and the error that caused it.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    mut operation: F,
    mut on_retry: R,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
    R: FnMut(u32, &E),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                };
            }
            Err(error) => {
                if attempt + 1 >= max_attempts {
                    return RetryOutcome {
                        result: Err(error),
                        attempts: attempt + 1,
                    };
                }

                let delay = policy.backoff.delay_for(attempt as usize);
                tracing::info!(
                    attempt = attempt + 1,
                    delay = ?delay,
                    error = %error,
                    "Attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;

                attempt += 1;
                on_retry(attempt, &error);
            }
        }
    }
}
