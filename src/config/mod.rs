//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! CLI flags (flags.rs)
//!     → --config path, --job / --disable-job
//!
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → handed to logging and the supervisor at process entry
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod flags;
pub mod loader;
pub mod schema;
pub mod validation;

pub use flags::Flags;
pub use loader::{load_config, ConfigError};
pub use schema::{AppConfig, GovernorConfig, LoggerConfig};
