//! Shutdown modes and the one-shot guard shared by both stop paths.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::error;

/// How servers are asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopMode {
    /// Servers get a cancellable graceful stop.
    Graceful,
    /// Everything is stopped immediately.
    Immediate,
}

/// Runs an async body at most once.
///
/// The body runs on its own task, so dropping the caller that won the race
/// does not abort it. Every caller, winner or not, returns only after the
/// body has finished.
#[derive(Debug)]
pub struct OneShot {
    claimed: AtomicBool,
    done: Arc<watch::Sender<bool>>,
}

impl Default for OneShot {
    fn default() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            claimed: AtomicBool::new(false),
            done: Arc::new(done),
        }
    }
}

impl OneShot {
    /// Create an unclaimed guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `body` unless it was already claimed. Returns whether this call claimed it.
    ///
    /// Must be called inside a Tokio runtime.
    pub async fn run<F, Fut>(&self, body: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let won = self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if won {
            let fut = body();
            let done = Arc::clone(&self.done);
            tokio::spawn(async move {
                if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
                    error!("Guarded body panicked");
                }
                done.send_replace(true);
            });
        }

        self.wait().await;
        won
    }

    /// Wait until the claimed body has finished.
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }

    /// True once a body has completed.
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }
}
