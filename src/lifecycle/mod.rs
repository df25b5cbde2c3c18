//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs, supervisor.rs):
//!     Initialize → banner → caller steps (fail fast)
//!
//! Run (supervisor.rs):
//!     Signal listener → jobs → serve loops (cycle.rs) → registry → block
//!
//! Shutdown (shutdown.rs, hooks.rs, cycle.rs):
//!     BeforeStop hooks → registry close → dispatch stops → wait → AfterStop hooks
//!
//! Signals (signals.rs):
//!     First SIGINT/SIGTERM → graceful stop, SIGQUIT → immediate stop
//!     Second signal → exit(128 + first signal number)
//! ```
//!
//! # Design Decisions
//! - Every transition is guarded by a one-shot primitive
//! - AfterStop hooks only run once every dispatched stop has finished
//! - No shutdown deadline of our own; a second signal is the escape hatch

pub mod cycle;
pub mod hooks;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use cycle::{Cycle, OperationFailure};
pub use hooks::{Hook, HookRegistry, HookStack, HookStage};
pub use shutdown::{OneShot, StopMode};
pub use signals::{ShutdownSignal, SignalHandle, SignalListener, SignalState};
pub use startup::Step;
pub use supervisor::{LifecycleState, Supervisor};
