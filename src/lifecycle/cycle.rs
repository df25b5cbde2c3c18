//! Lifecycle coordinator.
//!
//! # Responsibilities
//! - Run dispatched operations on independent tasks
//! - Track the set of operations still in flight
//! - Let callers wait for that set to become empty
//! - Collect failures instead of propagating them
//!
//! # Design Decisions
//! - The pending count lives in a watch channel so waiters park instead of polling
//! - Each operation holds a guard; the count drops even if the operation panics
//! - No ordering among operations of the same batch

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{BoxError, SupervisorError};
use crate::observability::metrics;

/// A dispatched operation that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFailure {
    /// Name given at dispatch time.
    pub operation: String,
    /// Rendered error or panic message.
    pub error: String,
}

/// Tracks in-flight operations and signals quiescence.
#[derive(Debug)]
pub struct Cycle {
    /// Number of operations dispatched but not yet finished.
    pending: Arc<watch::Sender<usize>>,
    /// Set once the coordinator is released.
    closed: AtomicBool,
    /// Failures observed so far, in completion order.
    failures: Arc<Mutex<Vec<OperationFailure>>>,
}

impl Cycle {
    /// Create an open coordinator with nothing pending.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            pending: Arc::new(tx),
            closed: AtomicBool::new(false),
            failures: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Run `op` on its own task.
    ///
    /// The operation is counted as pending before the task starts. Errors and
    /// panics are logged and recorded, never returned here.
    pub fn dispatch<F>(&self, operation: impl Into<String>, op: F) -> Result<(), SupervisorError>
    where
        F: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        if self.is_closed() {
            return Err(SupervisorError::CoordinatorClosed);
        }

        let operation = operation.into();
        let guard = self.track();
        let failures = Arc::clone(&self.failures);

        tokio::spawn(async move {
            let _guard = guard;
            let error = match AssertUnwindSafe(op).catch_unwind().await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(panic) => Some(panic_message(panic.as_ref())),
            };

            metrics::record_operation(error.is_none());
            match error {
                None => tracing::debug!(operation = %operation, "Operation completed"),
                Some(error) => {
                    tracing::error!(operation = %operation, error = %error, "Operation failed");
                    failures.lock().push(OperationFailure { operation, error });
                }
            }
        });
        Ok(())
    }

    /// Wait until no dispatched operation is in flight.
    pub async fn wait(&self) {
        let mut rx = self.pending.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|pending| *pending == 0).await;
    }

    /// Release the coordinator. Later dispatches are rejected.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::debug!(pending = self.pending(), "Lifecycle coordinator closed");
        }
    }

    /// True once `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of operations currently in flight.
    pub fn pending(&self) -> usize {
        *self.pending.borrow()
    }

    /// Failures collected so far.
    pub fn failures(&self) -> Vec<OperationFailure> {
        self.failures.lock().clone()
    }

    fn track(&self) -> PendingGuard {
        self.pending.send_modify(|pending| *pending += 1);
        metrics::record_pending(self.pending());
        PendingGuard {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl Default for Cycle {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes one operation from the pending set when dropped.
#[derive(Debug)]
struct PendingGuard {
    pending: Arc<watch::Sender<usize>>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.pending.send_modify(|pending| *pending -= 1);
        metrics::record_pending(*self.pending.borrow());
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}
