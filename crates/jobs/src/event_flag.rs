//! A one-shot, settable async flag. Used for a job's cancel signal and done
//! signal: cheap to check synchronously from a hot loop, awaitable from a
//! task that wants to block until it fires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

#[derive(Clone)]
pub struct AsyncEvent {
    inner: Arc<Inner>,
}

struct Inner {
    fired: AtomicBool,
    notify: Notify,
}

impl AsyncEvent {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Idempotent: firing an already-fired event is a no-op.
    pub fn set(&self) {
        if !self.inner.fired.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_set(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Waits until [`AsyncEvent::set`] has been called, possibly before this
    /// call. Registers for notification before re-checking the flag so a
    /// `set()` racing with `wait()` can never be missed.
    pub async fn wait(&self) {
        loop {
            if self.is_set() {
                return;
            }
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for AsyncEvent {
    fn default() -> Self {
        Self::new()
    }
}
