//! Capabilities the supervisor drives.
//!
//! Implementors are shared as `Arc<dyn _>` between the supervisor and the
//! tasks it spawns, so every method takes `&self`.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;
use crate::service::descriptor::ServiceDescriptor;

/// A long-running network server.
#[async_trait]
pub trait Server: Send + Sync + 'static {
    /// Serve until told to stop. Returns once the server has stopped.
    async fn serve(&self) -> Result<(), BoxError>;

    /// Stop immediately, dropping in-flight work.
    async fn stop(&self) -> Result<(), BoxError>;

    /// Stop accepting new work and finish in-flight work.
    ///
    /// Implementations should give up and return when `token` is cancelled.
    async fn graceful_stop(&self, token: CancellationToken) -> Result<(), BoxError>;

    /// Descriptor reported to the registry.
    fn info(&self) -> ServiceDescriptor;
}

/// A background worker. Workers only have an immediate stop.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn stop(&self) -> Result<(), BoxError>;
}

/// A named one-off job, selected at launch by name.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn run(&self) -> Result<(), BoxError>;
}
