use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};

/// Why the pipeline stopped before the scheduler ran out of ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// External interrupt (Ctrl-C).
    Interrupted,
    /// The frame producer failed to evaluate the shader.
    RenderFailed,
    /// The encoder stopped consuming frames with an error.
    EncodeFailed,
}

struct Inner {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancelReason>>,
    // Never sends; dropping it disconnects `signal` and wakes every waiter.
    trigger: Mutex<Option<Sender<()>>>,
    signal: Receiver<()>,
}

/// Shared, cooperative cancellation signal.
///
/// Cloning is cheap and every clone observes the same state. The first
/// recorded reason wins; later calls to [`cancel`](Self::cancel) are no-ops.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                reason: Mutex::new(None),
                trigger: Mutex::new(Some(trigger)),
                signal,
            }),
        }
    }

    pub fn cancel(&self, reason: CancelReason) {
        {
            let mut slot = self
                .inner
                .reason
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_none() {
                *slot = Some(reason);
                tracing::debug!(?reason, "pipeline cancellation requested");
            }
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self
            .inner
            .reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Channel that becomes disconnected once the token is cancelled.
    ///
    /// Intended for `crossbeam_channel::select!` next to a blocking send or
    /// receive: `recv(token.signal()) -> _ => ...` fires on cancellation.
    pub fn signal(&self) -> &Receiver<()> {
        &self.inner.signal
    }

    /// Sleeps for `duration` unless cancelled first. Returns `false` when woken
    /// by cancellation.
    pub fn sleep(&self, duration: Duration) -> bool {
        if duration.is_zero() {
            return !self.is_cancelled();
        }
        matches!(
            self.inner.signal.recv_timeout(duration),
            Err(RecvTimeoutError::Timeout)
        )
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}
