//! Cancellation scope for asynchronous consumers.
//!
//! A mounted view (or any other short-lived consumer) owns a [`Scope`]. Work
//! started on its behalf runs through [`Scope::run`]; once the scope is
//! cancelled the result of that work is dropped instead of being applied, so
//! nothing mutates state after teardown.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct ScopeInner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cloneable cancellation token.
///
/// All clones observe the same cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the scope. Idempotent.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            tracing::trace!("scope cancelled");
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the scope has been cancelled.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent `cancel` is not missed.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Drive `fut` unless the scope is cancelled first.
    ///
    /// Returns `None` when the scope was cancelled before or while `fut` ran;
    /// in that case `fut` is dropped and its output is never observed.
    pub async fn run<F>(&self, fut: F) -> Option<F::Output>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return None;
        }

        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => {
                if self.is_cancelled() { None } else { Some(out) }
            }
        }
    }

    /// Guard that cancels this scope when dropped (i.e. on unmount).
    pub fn cancel_on_drop(&self) -> CancelOnDrop {
        CancelOnDrop {
            scope: self.clone(),
        }
    }
}

/// Cancels its scope when dropped.
#[derive(Debug)]
#[must_use = "the scope is cancelled as soon as the guard is dropped"]
pub struct CancelOnDrop {
    scope: Scope,
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}
