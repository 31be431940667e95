use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::classify::{RetrySignal, default_classifier};

pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Decides whether a failed attempt should be retried.
pub type Classifier<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// How many times to try an operation and how long to wait in between.
///
/// ```
/// use std::time::Duration;
/// use sms_retry::RetryPolicy;
///
/// let policy: RetryPolicy<String> = RetryPolicy::new(3, Duration::from_millis(100));
/// assert_eq!(policy.next_delay(Duration::from_millis(100)), Duration::from_millis(200));
/// assert_eq!(policy.next_delay(Duration::from_secs(20)), Duration::from_secs(30));
/// ```
pub struct RetryPolicy<E> {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    classifier: Classifier<E>,
}

impl<E: RetrySignal + 'static> RetryPolicy<E> {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::with_classifier(max_attempts, initial_delay, default_classifier::<E>)
    }
}

impl<E> RetryPolicy<E> {
    pub fn with_classifier<F>(max_attempts: u32, initial_delay: Duration, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts,
            initial_delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
            classifier: Arc::new(classifier),
        }
    }

    #[must_use]
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    #[must_use]
    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    #[must_use]
    pub fn classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    pub fn is_retriable(&self, err: &E) -> bool {
        (self.classifier)(err)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("retry attempts must be greater than 0".into());
        }
        if !self.multiplier.is_finite() || self.multiplier <= 0.0 {
            return Err(format!(
                "backoff multiplier must be a positive number, got {}",
                self.multiplier
            ));
        }
        Ok(())
    }

    /// Delay to wait after a failure when the previous delay was `current`.
    pub fn next_delay(&self, current: Duration) -> Duration {
        Duration::try_from_secs_f64(current.as_secs_f64() * self.multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.multiplier,
            classifier: Arc::clone(&self.classifier),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("max_delay", &self.max_delay)
            .field("multiplier", &self.multiplier)
            .finish_non_exhaustive()
    }
}
