//! Retry engine used by the dispatch registry.
//!
//! [`execute`] drives an async operation under a [`RetryPolicy`], sleeping with exponential
//! backoff between failed attempts and giving up early when the caller's [`Cancellation`]
//! fires. Whether a failure is worth another attempt is decided by the policy's classifier;
//! the default one understands any error implementing [`RetrySignal`].
pub mod cancel;
pub mod classify;
pub mod engine;
pub mod policy;

pub use cancel::{CancelHandle, CancelReason, Cancellation};
pub use classify::{FailureKind, RetrySignal, default_classifier, is_retriable_status};
pub use engine::{RetryError, RetryOutcome, execute};
pub use policy::{Classifier, DEFAULT_MAX_DELAY, DEFAULT_MULTIPLIER, RetryPolicy};
