//! Service model subsystem.
//!
//! # Data Flow
//! ```text
//! Environment (APP_*)
//!     → identity.rs (AppIdentity)
//!     → descriptor.rs (ServiceDescriptor per server)
//!     → registry.rs (announced on run, deregistered on stop)
//!
//! traits.rs:
//!     Server (serve / stop / graceful_stop / info)
//!     Worker (stop)
//!     Job    (name / run), filtered by jobs.rs
//! ```

pub mod descriptor;
pub mod identity;
pub mod jobs;
pub mod registry;
pub mod traits;

pub use descriptor::{ServiceDescriptor, ServiceKind, SubService};
pub use identity::AppIdentity;
pub use jobs::{JobDecision, JobSelection};
pub use registry::{NopRegistry, Registry};
pub use traits::{Job, Server, Worker};
