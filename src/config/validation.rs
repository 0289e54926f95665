//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check the bind address parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.limits.max_frame_bytes == 0 {
        errors.push(ValidationError::new("limits.max_frame_bytes", "must be greater than 0"));
    }
    if config.limits.unauthenticated_frame_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.unauthenticated_frame_bytes",
            "must be greater than 0",
        ));
    } else if config.limits.unauthenticated_frame_bytes > config.limits.max_frame_bytes {
        errors.push(ValidationError::new(
            "limits.unauthenticated_frame_bytes",
            "must not exceed limits.max_frame_bytes",
        ));
    }
    if config.auth.password.is_empty() {
        errors.push(ValidationError::new("auth.password", "must be set"));
    }
    if config.timeouts.client_idle_secs == 0 {
        errors.push(ValidationError::new("timeouts.client_idle_secs", "must be greater than 0"));
    }
    if config.timeouts.server_secs == 0 {
        errors.push(ValidationError::new("timeouts.server_secs", "must be greater than 0"));
    }
    if config.upstream.idle_timeout_secs > 0 && config.upstream.sweep_interval_secs == 0 {
        errors.push(ValidationError::new(
            "upstream.sweep_interval_secs",
            "must be greater than 0 when idle eviction is enabled",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
