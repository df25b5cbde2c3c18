//! Metrics collection.
//!
//! # Responsibilities
//! - Record supervisor and log sink activity through the `metrics` facade
//!
//! # Metrics
//! - `supervisor_operations_total` (counter): dispatched operations by outcome
//! - `supervisor_pending_operations` (gauge): operations still in flight
//! - `supervisor_hook_failures_total` (counter): failed hooks by stage
//! - `supervisor_signals_total` (counter): termination signals by name
//! - `log_sink_flushes_total` (counter): buffered sink flushes by outcome
//!
//! # Design Decisions
//! - No exporter is installed here; without a recorder every call is a no-op

use metrics::{counter, gauge};

/// Record the completion of a dispatched operation.
pub fn record_operation(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("supervisor_operations_total", "outcome" => outcome).increment(1);
}

/// Record the current size of the coordinator's pending set.
pub fn record_pending(pending: usize) {
    gauge!("supervisor_pending_operations").set(pending as f64);
}

/// Record a failed hook.
pub fn record_hook_failure(stage: &str) {
    counter!("supervisor_hook_failures_total", "stage" => stage.to_string()).increment(1);
}

/// Record a received termination signal.
pub fn record_signal(signal: &'static str) {
    counter!("supervisor_signals_total", "signal" => signal).increment(1);
}

/// Record a buffered sink flush.
pub fn record_flush(ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!("log_sink_flushes_total", "outcome" => outcome).increment(1);
}
