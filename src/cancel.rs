//! Cooperative cancellation for reasoning requests.
//!
//! A [`CancellationToken`] is cloned into every part of a request. Graph
//! search polls [`is_cancelled`](CancellationToken::is_cancelled) between
//! hops; external calls race against [`cancelled`](CancellationToken::cancelled)
//! through [`guarded`].

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use crate::error::{EngineError, EngineResult};

/// Something that can be asked to stop.
pub trait Cancellable {
    /// Whether cancellation was requested or the deadline passed.
    fn is_cancelled(&self) -> bool;

    /// Request cancellation.
    fn cancel(&self);
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token that never expires on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that reports cancelled once `timeout` has elapsed.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::default(),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Share the flag but tighten the deadline; the earlier deadline wins.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            inner: Arc::clone(&self.inner),
            deadline: Some(deadline),
        }
    }

    /// Request cancellation for this token and every clone of it.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Resolve once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking the flag so a concurrent cancel is not lost.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            match self.deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => return,
                    }
                }
                None => notified.await,
            }
        }
    }
}

impl Cancellable for CancellationToken {
    fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    fn cancel(&self) {
        CancellationToken::cancel(self)
    }
}

/// Run an external call under a timeout and a cancellation token.
///
/// Timeout, cancellation and the call's own failure all come back as
/// `ExternalServiceUnavailable` naming `service`.
pub async fn guarded<T, F>(
    service: &str,
    timeout: Duration,
    token: &CancellationToken,
    call: F,
) -> EngineResult<T>
where
    F: Future<Output = EngineResult<T>>,
{
    if token.is_cancelled() {
        return Err(EngineError::unavailable(service, "request cancelled"));
    }
    tokio::select! {
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => {
                warn!(service, timeout_ms = timeout.as_millis() as u64, "External call timed out");
                Err(EngineError::unavailable(
                    service,
                    format!("timed out after {}ms", timeout.as_millis()),
                ))
            }
        },
        _ = token.cancelled() => {
            warn!(service, "External call cancelled");
            Err(EngineError::unavailable(service, "request cancelled"))
        }
    }
}
