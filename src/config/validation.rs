//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (buffer sizes, intervals, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::filter::LevelFilter;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("logger.name must not be empty")]
    EmptyLogName,

    #[error("logger.level {0:?} is not a valid level")]
    InvalidLevel(String),

    #[error("logger.buffer_size must be greater than zero")]
    ZeroBufferSize,

    #[error("logger.flush_interval_secs must be greater than zero")]
    ZeroFlushInterval,

    #[error("governor.bind_address {0:?} is not a socket address")]
    InvalidBindAddress(String),

    #[error("governor.max_connections must be greater than zero")]
    ZeroMaxConnections,
}

/// Check a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let logger = &config.logger;

    if logger.name.trim().is_empty() {
        errors.push(ValidationError::EmptyLogName);
    }
    if logger.level.parse::<LevelFilter>().is_err() {
        errors.push(ValidationError::InvalidLevel(logger.level.clone()));
    }
    if logger.async_write && logger.buffer_size == 0 {
        errors.push(ValidationError::ZeroBufferSize);
    }
    if logger.async_write && logger.flush_interval_secs == 0 {
        errors.push(ValidationError::ZeroFlushInterval);
    }
    if config.governor.enabled && config.governor.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.governor.bind_address.clone(),
        ));
    }
    if config.governor.enabled && config.governor.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
