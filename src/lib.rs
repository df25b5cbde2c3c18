//! Process lifecycle supervisor.
//!
//! Owns an application's servers, workers and jobs, drives them through
//! startup, run and shutdown, and reacts to termination signals.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod service;

pub use config::schema::AppConfig;
pub use error::{BoxError, SupervisorError};
pub use lifecycle::{HookStage, LifecycleState, Supervisor};
pub use net::GovernorServer;
pub use service::{AppIdentity, Job, Registry, Server, ServiceDescriptor, Worker};
