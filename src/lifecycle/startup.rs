//! Startup orchestration.
//!
//! # Responsibilities
//! - Run caller-supplied startup steps in order
//!
//! # Design Decisions
//! - Fail fast: the first failing step stops the sequence

use crate::error::BoxError;

/// A fallible startup step.
pub type Step = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Run `steps` in order until one fails.
pub fn run_serial<I>(steps: I) -> Result<(), BoxError>
where
    I: IntoIterator<Item = Step>,
{
    for (idx, step) in steps.into_iter().enumerate() {
        if let Err(e) = step() {
            tracing::error!(step = idx + 1, error = %e, "Startup step failed");
            return Err(e);
        }
    }
    Ok(())
}
