use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cancel::{CancelReason, Cancellation};
use crate::policy::RetryPolicy;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed; wraps the last error.
    #[error("maximum retry attempts reached: {0}")]
    Exhausted(#[source] E),
    /// The classifier refused to retry this error.
    #[error(transparent)]
    Permanent(E),
    #[error("retry aborted: {0}")]
    Cancelled(CancelReason),
    #[error("invalid retry policy: {0}")]
    InvalidPolicy(String),
}

impl<E> RetryError<E> {
    /// The backend error behind this failure, if one was observed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            RetryError::Exhausted(err) | RetryError::Permanent(err) => Some(err),
            RetryError::Cancelled(_) | RetryError::InvalidPolicy(_) => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted(_))
    }
}

/// What happened while running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, RetryError<E>>,
    /// Attempts actually started.
    pub attempts: u32,
    /// Backoff delays fully waited, in order.
    pub delays: Vec<Duration>,
}

impl<T, E> RetryOutcome<T, E> {
    pub fn into_result(self) -> Result<T, RetryError<E>> {
        self.result
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }
}

/// Runs `operation` until it succeeds, fails permanently, runs out of attempts or
/// `cancellation` fires.
///
/// The operation receives the 1-based attempt number. The first backoff is
/// `initial_delay * multiplier`, later ones keep multiplying up to `max_delay`.
/// Cancellation is checked before every attempt and raced against every backoff sleep.
/// An attempt already in flight is left to observe the signal itself, and if it then
/// fails the outcome is [`RetryError::Cancelled`] rather than exhaustion or a permanent
/// failure.
pub async fn execute<T, E, F, Fut>(
    cancellation: &Cancellation,
    policy: &RetryPolicy<E>,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0u32;
    let mut delays = Vec::new();

    if let Err(reason) = policy.validate() {
        return RetryOutcome {
            result: Err(RetryError::InvalidPolicy(reason)),
            attempts,
            delays,
        };
    }

    let mut delay = policy.initial_delay;
    loop {
        if let Some(reason) = cancellation.reason() {
            debug!(attempts, %reason, "retry loop stopped before next attempt");
            return RetryOutcome {
                result: Err(RetryError::Cancelled(reason)),
                attempts,
                delays,
            };
        }

        attempts += 1;
        let err = match operation(attempts).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                    delays,
                };
            }
            Err(err) => err,
        };

        // A signal that fired during the attempt outranks whatever the attempt reported.
        if let Some(reason) = cancellation.reason() {
            debug!(attempts, %reason, error = %err, "attempt failed after cancellation");
            return RetryOutcome {
                result: Err(RetryError::Cancelled(reason)),
                attempts,
                delays,
            };
        }

        if attempts >= policy.max_attempts {
            warn!(attempts, error = %err, "attempt failed; no attempts left");
            return RetryOutcome {
                result: Err(RetryError::Exhausted(err)),
                attempts,
                delays,
            };
        }
        if !policy.is_retriable(&err) {
            debug!(attempts, error = %err, "attempt failed with non-retriable error");
            return RetryOutcome {
                result: Err(RetryError::Permanent(err)),
                attempts,
                delays,
            };
        }

        delay = policy.next_delay(delay);
        warn!(
            attempt = attempts,
            max_attempts = policy.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "attempt failed; retrying"
        );

        tokio::select! {
            biased;
            reason = cancellation.cancelled() => {
                debug!(attempts, %reason, "retry backoff interrupted");
                return RetryOutcome {
                    result: Err(RetryError::Cancelled(reason)),
                    attempts,
                    delays,
                };
            }
            _ = sleep(delay) => delays.push(delay),
        }
    }
}
