//! Configuration schema definitions.
//!
//! `ServiceConfig` is the file form: every field has a default so a minimal
//! (or absent) config file works. Required values that have no sensible
//! default are `Option`s here and get resolved against the environment by
//! the loader, which produces a [`Settings`].

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Default bound on the shutdown sequence.
///
/// The service this replaces used 500µs, which is too short for any
/// connection to drain.
pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service identity.
    pub service: ServiceSection,

    /// Listener configuration (port, connection limits).
    pub listener: ListenerConfig,

    /// Messaging endpoint and subscriptions.
    pub messaging: MessagingConfig,

    /// Shutdown behaviour.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSection {
    /// Name used in logs and as the messaging client name.
    pub name: String,
}

impl Default for ServiceSection {
    fn default() -> Self {
        Self {
            name: "auth service".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host to bind. The port is required and has no default.
    pub host: String,

    /// Port to listen on.
    pub port: Option<u16>,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: None,
            max_connections: 10_000,
            request_timeout_secs: 30,
        }
    }
}

/// Messaging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// WebSocket endpoint of the message broker (ws://).
    pub url: Option<String>,

    /// Subjects to subscribe to.
    pub subjects: Vec<String>,

    /// Optional queue group shared by all subscriptions.
    pub queue_group: Option<String>,

    /// Connect (and handshake) timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            url: None,
            subjects: vec!["followers.get".to_string()],
            queue_group: None,
            connect_timeout_secs: 5,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound on the shutdown sequence, in milliseconds.
    pub grace_period_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Fully resolved settings, produced by the loader once every required value
/// is present and well formed.
#[derive(Debug, Clone)]
pub struct Settings {
    pub service_name: String,
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
    pub request_timeout: Duration,
    pub messaging: MessagingSettings,
    pub grace_period: Duration,
    pub observability: ObservabilityConfig,
}

/// Resolved messaging settings.
#[derive(Debug, Clone)]
pub struct MessagingSettings {
    pub url: Url,
    pub client_name: String,
    pub subjects: Vec<String>,
    pub queue_group: Option<String>,
    pub connect_timeout: Duration,
}
