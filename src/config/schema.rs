//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files, and
//! every field has a default so an empty file is a valid configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::sink::{DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_INTERVAL};
use crate::service::identity::{AppIdentity, ENV_APP_LOG_DIR};

/// Root configuration for a supervised application.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Identity overrides.
    pub app: AppSection,

    /// Logger settings.
    pub logger: LoggerConfig,

    /// Built-in governor server.
    pub governor: GovernorConfig,
}

/// Identity overrides; unset fields fall back to the environment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    pub instance: Option<String>,
    pub region: Option<String>,
    pub zone: Option<String>,
    pub deployment: Option<String>,
}

impl AppSection {
    /// Apply the configured overrides on top of `base`.
    pub fn apply(&self, mut base: AppIdentity) -> AppIdentity {
        let overrides = [
            (&self.name, &mut base.name),
            (&self.instance, &mut base.instance),
            (&self.region, &mut base.region),
            (&self.zone, &mut base.zone),
            (&self.deployment, &mut base.deployment),
        ];
        for (value, slot) in overrides {
            if let Some(value) = value {
                *slot = value.clone();
            }
        }
        base
    }
}

/// Logger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory holding the log file.
    pub dir: String,

    /// Log file name.
    pub name: String,

    /// Minimum level (trace, debug, info, warn, error).
    pub level: String,

    /// Write plain text to stdout instead of JSON to a file.
    pub debug: bool,

    /// Buffer writes in memory and flush in the background.
    #[serde(rename = "async")]
    pub async_write: bool,

    /// Buffer capacity in bytes.
    pub buffer_size: usize,

    /// Seconds between background flushes.
    pub flush_interval_secs: u64,

    /// Rotate the file beyond this size in megabytes.
    pub max_size_mb: u64,

    /// Delete rotated files older than this many days.
    pub max_age_days: u64,

    /// Number of rotated files to keep.
    pub max_backup: usize,
}

impl LoggerConfig {
    /// Full path of the log file.
    pub fn filename(&self) -> PathBuf {
        PathBuf::from(&self.dir).join(&self.name)
    }

    /// Get the flush interval as a `Duration`.
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            dir: std::env::var(ENV_APP_LOG_DIR).unwrap_or_else(|_| ".".to_string()),
            name: "default.log".to_string(),
            level: "info".to_string(),
            debug: false,
            async_write: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL.as_secs(),
            max_size_mb: 500,
            max_age_days: 1,
            max_backup: 10,
        }
    }
}

/// Governor server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GovernorConfig {
    /// Start the governor server.
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:9990").
    pub bind_address: String,

    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:9990".to_string(),
            max_connections: 64,
        }
    }
}
