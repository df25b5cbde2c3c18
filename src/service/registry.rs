//! Service registry collaborator.

use async_trait::async_trait;

use crate::error::BoxError;
use crate::service::descriptor::ServiceDescriptor;

/// Where running servers announce themselves.
///
/// Failures are logged by the supervisor and never abort startup or shutdown.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Announce a server.
    async fn register(&self, info: &ServiceDescriptor) -> Result<(), BoxError>;

    /// Deregister everything this process announced.
    async fn close(&self) -> Result<(), BoxError>;
}

/// Registry that accepts everything and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NopRegistry;

#[async_trait]
impl Registry for NopRegistry {
    async fn register(&self, info: &ServiceDescriptor) -> Result<(), BoxError> {
        tracing::debug!(service = %info.name, label = %info.label(), "Nop registry: register");
        Ok(())
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
