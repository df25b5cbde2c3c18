//! Error types shared across the supervisor.

use thiserror::Error;

use crate::lifecycle::hooks::HookStage;

/// Boxed error returned by hooks, dispatched operations and service capabilities.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by the supervisor itself.
///
/// Failures of individual hooks or dispatched operations are never surfaced
/// here; they are logged and collected where they happen.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The hook registry has no collection for this stage.
    #[error("hook stage not found: {0}")]
    StageNotFound(HookStage),

    /// A stage name did not match any known stage.
    #[error("unknown hook stage name: {0:?}")]
    UnknownStage(String),

    /// The coordinator was released; no more operations can be dispatched.
    #[error("lifecycle coordinator is closed")]
    CoordinatorClosed,

    /// A startup step failed.
    #[error("startup failed: {0}")]
    Startup(#[source] BoxError),

    /// Installing OS signal handlers failed.
    #[error("failed to install signal handlers: {0}")]
    Signal(#[from] std::io::Error),
}
