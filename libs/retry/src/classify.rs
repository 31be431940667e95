use std::fmt::Display;
use std::io;

/// Structured category of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Connection-level failure (refused, reset, DNS, TLS, ...).
    Network,
    Timeout,
    /// The remote answered with this HTTP status.
    Status(u16),
    Cancelled,
    /// The error is known to be final (bad input, unsupported operation, ...).
    Permanent,
    /// Nothing structured is known; only the error text can be inspected.
    Opaque,
}

/// Errors that can describe themselves to the default classifier.
pub trait RetrySignal: Display {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Opaque
    }
}

const TRANSIENT_MARKERS: [&str; 8] = [
    "timeout",
    "connection refused",
    "connection reset",
    "temporary",
    "too many requests",
    "service unavailable",
    "status code: 5",
    "status=5",
];

/// 5xx and 429 are worth another attempt.
pub fn is_retriable_status(status: u16) -> bool {
    status >= 500 || status == 429
}

/// Classifier used by [`crate::RetryPolicy::new`].
///
/// Network failures, timeouts, 5xx and 429 retry; cancellations and permanent failures do
/// not. Opaque errors fall back to a case-insensitive scan of their message for well-known
/// transient markers.
pub fn default_classifier<E: RetrySignal + ?Sized>(err: &E) -> bool {
    match err.failure_kind() {
        FailureKind::Network | FailureKind::Timeout => true,
        FailureKind::Status(status) => is_retriable_status(status),
        FailureKind::Cancelled | FailureKind::Permanent => false,
        FailureKind::Opaque => {
            let text = err.to_string().to_lowercase();
            TRANSIENT_MARKERS.iter().any(|marker| text.contains(marker))
        }
    }
}

impl RetrySignal for io::Error {
    fn failure_kind(&self) -> FailureKind {
        io_failure_kind(self)
    }
}

impl RetrySignal for anyhow::Error {
    fn failure_kind(&self) -> FailureKind {
        self.chain()
            .find_map(|cause| cause.downcast_ref::<io::Error>())
            .map(io_failure_kind)
            .unwrap_or(FailureKind::Opaque)
    }
}

impl RetrySignal for String {}

impl RetrySignal for &str {}

fn io_failure_kind(err: &io::Error) -> FailureKind {
    match err.kind() {
        io::ErrorKind::TimedOut => FailureKind::Timeout,
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::AddrNotAvailable => FailureKind::Network,
        _ => FailureKind::Opaque,
    }
}
