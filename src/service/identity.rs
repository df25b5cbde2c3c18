//! Application identity resolved from the environment.

use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ENV_APP_NAME: &str = "APP_NAME";
pub const ENV_APP_INSTANCE: &str = "APP_INSTANCE";
pub const ENV_APP_REGION: &str = "APP_REGION";
pub const ENV_APP_ZONE: &str = "APP_ZONE";
pub const ENV_APP_DEPLOYMENT: &str = "APP_DEPLOYMENT";
pub const ENV_APP_LOG_DIR: &str = "APP_LOG_DIR";

/// Who this process is, as reported to registries and in the version banner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    /// Application name.
    pub name: String,
    /// Unique instance identifier.
    pub instance: String,
    pub region: String,
    pub zone: String,
    /// Deployment group; isolates traffic between independently deployed groups.
    pub deployment: String,
}

impl AppIdentity {
    /// Resolve the identity from `APP_*` environment variables.
    ///
    /// Falls back to the executable name and a random instance id.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the identity through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            name: get(ENV_APP_NAME).unwrap_or_else(executable_name),
            instance: get(ENV_APP_INSTANCE).unwrap_or_else(|| Uuid::new_v4().to_string()),
            region: get(ENV_APP_REGION).unwrap_or_default(),
            zone: get(ENV_APP_ZONE).unwrap_or_default(),
            deployment: get(ENV_APP_DEPLOYMENT).unwrap_or_default(),
        }
    }

    /// Multi-line banner printed by `--version`.
    pub fn version_banner(&self) -> String {
        format!(
            "name: {}\nversion: {}\ninstance: {}\nregion: {}\nzone: {}\ndeployment: {}",
            self.name,
            env!("CARGO_PKG_VERSION"),
            self.instance,
            self.region,
            self.zone,
            self.deployment,
        )
    }
}

impl Default for AppIdentity {
    fn default() -> Self {
        Self::from_env()
    }
}

fn executable_name() -> String {
    std::env::args()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_identity_from_lookup() {
        let vars: HashMap<&str, &str> = [
            (ENV_APP_NAME, "orders"),
            (ENV_APP_INSTANCE, "orders-7"),
            (ENV_APP_REGION, "eu-west"),
            (ENV_APP_ZONE, "eu-west-1a"),
            (ENV_APP_DEPLOYMENT, "canary"),
        ]
        .into_iter()
        .collect();

        let identity = AppIdentity::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(identity.name, "orders");
        assert_eq!(identity.instance, "orders-7");
        assert_eq!(identity.region, "eu-west");
        assert_eq!(identity.zone, "eu-west-1a");
        assert_eq!(identity.deployment, "canary");
    }

    #[test]
    fn test_identity_fallbacks() {
        let identity = AppIdentity::from_lookup(|_| None);
        assert!(!identity.name.is_empty());
        assert!(Uuid::parse_str(&identity.instance).is_ok());
        assert!(identity.region.is_empty());
    }

    #[test]
    fn test_version_banner_lists_identity() {
        let identity = AppIdentity::from_lookup(|k| (k == ENV_APP_NAME).then(|| "billing".to_string()));
        let banner = identity.version_banner();
        assert!(banner.starts_with("name: billing\n"));
        assert!(banner.contains(&format!("version: {}", env!("CARGO_PKG_VERSION"))));
        assert!(banner.contains(&identity.instance));
    }
}
