//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Check addresses and subjects are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs after the environment overlay, before settings are resolved

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::ServiceConfig;

/// Upper bound accepted for the shutdown grace period (10 minutes).
pub const MAX_GRACE_PERIOD_MS: u64 = 600_000;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `shutdown.grace_period_ms`.
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

/// Check the configuration for values serde accepts but the service cannot
/// run with.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service.name.trim().is_empty() {
        errors.push(ValidationError::new("service.name", "must not be empty"));
    }

    if config.listener.host.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.host",
            format!("'{}' is not an IP address", config.listener.host),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "listener.request_timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.messaging.connect_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "messaging.connect_timeout_secs",
            "must be greater than 0",
        ));
    }
    for subject in &config.messaging.subjects {
        if subject.is_empty() || subject.chars().any(char::is_whitespace) {
            errors.push(ValidationError::new(
                "messaging.subjects",
                format!("'{}' is not a valid subject", subject),
            ));
        }
    }
    if let Some(group) = &config.messaging.queue_group {
        if group.is_empty() || group.chars().any(char::is_whitespace) {
            errors.push(ValidationError::new(
                "messaging.queue_group",
                format!("'{}' is not a valid queue group", group),
            ));
        }
    }

    let grace = config.shutdown.grace_period_ms;
    if grace == 0 || grace > MAX_GRACE_PERIOD_MS {
        errors.push(ValidationError::new(
            "shutdown.grace_period_ms",
            format!("must be between 1 and {} (got {})", MAX_GRACE_PERIOD_MS, grace),
        ));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}', expected 'pretty' or 'json'", other),
        )),
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
