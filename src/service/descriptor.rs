//! Service descriptors consumed by registries.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::service::identity::AppIdentity;

/// Metadata key carrying the load-balancing group.
pub const KEY_BALANCE_GROUP: &str = "__group";
/// Group used when none is configured.
pub const DEFAULT_BALANCE_GROUP: &str = "default";

/// Role a service plays in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    #[default]
    Unknown,
    Provider,
    Governor,
    Consumer,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceKind::Unknown => "unknown",
            ServiceKind::Provider => "providers",
            ServiceKind::Governor => "governors",
            ServiceKind::Consumer => "consumers",
        };
        f.write_str(s)
    }
}

/// A sub-service exposed by a server (e.g. one RPC service of a gRPC server).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubService {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Everything a registry needs to know about one running server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    pub name: String,
    /// Instance identity of the owning process.
    pub app_id: String,
    /// Network scheme, e.g. `tcp`, `http`, `grpc`.
    pub scheme: String,
    /// Network address, e.g. `10.0.0.7:9090`.
    pub address: String,
    pub weight: u32,
    pub enable: bool,
    pub healthy: bool,
    pub metadata: BTreeMap<String, String>,
    pub region: String,
    pub zone: String,
    pub kind: ServiceKind,
    /// Deployment group; traffic is isolated between groups.
    pub deployment: String,
    /// Traffic group; load is balanced among instances of one group.
    pub group: String,
    pub services: BTreeMap<String, SubService>,
}

impl ServiceDescriptor {
    /// Descriptor for this process with default routing attributes.
    pub fn new(identity: &AppIdentity) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(KEY_BALANCE_GROUP.to_string(), DEFAULT_BALANCE_GROUP.to_string());

        Self {
            name: identity.name.clone(),
            app_id: identity.instance.clone(),
            scheme: "tcp".to_string(),
            address: String::new(),
            weight: 100,
            enable: true,
            healthy: true,
            metadata,
            region: identity.region.clone(),
            zone: identity.zone.clone(),
            kind: ServiceKind::Provider,
            deployment: identity.deployment.clone(),
            group: DEFAULT_BALANCE_GROUP.to_string(),
            services: BTreeMap::new(),
        }
    }

    /// `scheme://address`.
    pub fn label(&self) -> String {
        format!("{}://{}", self.scheme, self.address)
    }

    /// Set the service name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the network scheme.
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    /// Set the network address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Set the kind tag.
    pub fn with_kind(mut self, kind: ServiceKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the load-balancing weight.
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Insert one metadata entry, replacing any previous value for `key`.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Set the traffic group, mirrored into the `__group` metadata key.
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self.metadata
            .insert(KEY_BALANCE_GROUP.to_string(), self.group.clone());
        self
    }

    /// Set the deployment label.
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    /// Add a sub-service keyed by its name.
    pub fn with_service(mut self, service: SubService) -> Self {
        self.services.insert(service.name.clone(), service);
        self
    }
}
