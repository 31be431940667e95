use std::fmt;
use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};

/// Why an operation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// The owner of the [`CancelHandle`] asked to stop.
    Cancelled,
    /// The deadline attached to the [`Cancellation`] passed.
    DeadlineExceeded,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::Cancelled => "cancelled",
            CancelReason::DeadlineExceeded => "deadline exceeded",
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cooperative cancellation signal with an optional deadline.
///
/// Clones observe the same signal. A value built with [`Cancellation::never`] never fires
/// unless a deadline is attached to it.
///
/// ```
/// use std::time::Duration;
/// use sms_retry::{CancelReason, Cancellation};
///
/// let (cancellation, handle) = Cancellation::new();
/// assert!(cancellation.reason().is_none());
/// handle.cancel();
/// assert_eq!(cancellation.reason(), Some(CancelReason::Cancelled));
///
/// let expired = Cancellation::never().with_timeout(Duration::ZERO);
/// assert_eq!(expired.reason(), Some(CancelReason::DeadlineExceeded));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Option<Arc<watch::Sender<bool>>>,
    deadline: Option<Instant>,
}

/// Fires the [`Cancellation`] it was created with.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow()
    }
}

impl Cancellation {
    pub fn new() -> (Self, CancelHandle) {
        let (tx, _rx) = watch::channel(false);
        let flag = Arc::new(tx);
        (
            Self {
                flag: Some(Arc::clone(&flag)),
                deadline: None,
            },
            CancelHandle { flag },
        )
    }

    pub fn never() -> Self {
        Self::default()
    }

    /// Attaches a deadline; an earlier existing deadline is kept.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason this signal has already fired, if it has.
    pub fn reason(&self) -> Option<CancelReason> {
        if self.flag.as_ref().is_some_and(|flag| *flag.borrow()) {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the signal fires. Pending forever for [`Cancellation::never`].
    pub async fn cancelled(&self) -> CancelReason {
        let explicit = async {
            match &self.flag {
                Some(flag) => {
                    let mut rx = flag.subscribe();
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = explicit => CancelReason::Cancelled,
            _ = deadline => CancelReason::DeadlineExceeded,
        }
    }
}
