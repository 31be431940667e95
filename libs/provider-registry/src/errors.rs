use std::error::Error;
use std::fmt::{self, Display, Formatter};

use sms_retry::{CancelReason, FailureKind, RetrySignal};

/// Structured retry signature of a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorKind {
    /// The request never got a response (connect, DNS, TLS, reset).
    Network,
    Timeout,
    /// The backend answered with a non-success HTTP status.
    Http(u16),
    Cancelled,
    /// The backend does not offer this capability.
    Unsupported,
    /// The backend understood the request and refused it.
    Rejected,
    Other,
}

/// Error emitted by provider backends.
#[derive(Debug)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    code: String,
    message: String,
    retry_after_ms: Option<u64>,
    source: Option<anyhow::Error>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            retry_after_ms: None,
            source: None,
        }
    }

    pub fn network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, code, message)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Timeout, code, message)
    }

    pub fn http(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Http(status), code, message)
    }

    pub fn cancelled(code: impl Into<String>, reason: CancelReason) -> Self {
        Self::new(ProviderErrorKind::Cancelled, code, reason.to_string())
    }

    /// Deterministic, immediate failure for a capability the backend lacks.
    pub fn unsupported(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unsupported, code, message)
    }

    pub fn rejected(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Rejected, code, message)
    }

    pub fn other(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Other, code, message)
    }

    /// Attaches a source error for debugging purposes.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Backoff hint reported by the backend (for example a `Retry-After` header).
    #[must_use]
    pub fn with_retry_after(mut self, retry_after_ms: Option<u64>) -> Self {
        self.retry_after_ms = retry_after_ms;
        self
    }

    pub fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        self.retry_after_ms
    }

    /// Whether the default classifier would retry this failure.
    pub fn is_retryable(&self) -> bool {
        sms_retry::default_classifier(self)
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err.as_ref() as &(dyn Error + 'static))
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::other("internal_error", err.to_string()).with_source(err)
    }
}

impl RetrySignal for ProviderError {
    fn failure_kind(&self) -> FailureKind {
        match self.kind {
            ProviderErrorKind::Network => FailureKind::Network,
            ProviderErrorKind::Timeout => FailureKind::Timeout,
            ProviderErrorKind::Http(status) => FailureKind::Status(status),
            ProviderErrorKind::Cancelled => FailureKind::Cancelled,
            ProviderErrorKind::Unsupported | ProviderErrorKind::Rejected => FailureKind::Permanent,
            ProviderErrorKind::Other => FailureKind::Opaque,
        }
    }
}
