//! Configuration loading from disk and the process environment.

use std::collections::HashMap;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::{MessagingSettings, ServiceConfig, Settings};
use crate::config::validation::{validate_config, ValidationError};

/// Messaging endpoint (required).
pub const NATS_URL: &str = "NATS_URL";
/// Listen port (required).
pub const PORT: &str = "PORT";
pub const SERVICE_NAME: &str = "SERVICE_NAME";
pub const SHUTDOWN_GRACE_MS: &str = "SHUTDOWN_GRACE_MS";
pub const MAX_CONNECTIONS: &str = "MAX_CONNECTIONS";
pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
/// Comma-separated subject list.
pub const NATS_SUBJECTS: &str = "NATS_SUBJECTS";
pub const NATS_QUEUE_GROUP: &str = "NATS_QUEUE_GROUP";
pub const LOG_LEVEL: &str = "LOG_LEVEL";
pub const LOG_FORMAT: &str = "LOG_FORMAT";
/// Setting this also enables the metrics endpoint.
pub const METRICS_ADDR: &str = "METRICS_ADDR";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required setting {name} is missing")]
    Missing { name: &'static str },

    #[error("setting {name}='{value}' is malformed: {reason}")]
    Malformed {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lookup-by-name access to configuration values.
///
/// Returning `None` means the value is not set. Empty values are treated the
/// same as unset by the loader.
pub trait ConfigSource {
    fn lookup(&self, name: &str) -> Option<String>;
}

/// Reads values from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSource;

impl ConfigSource for EnvSource {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl ConfigSource for HashMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Load configuration from a TOML file (no validation, no environment).
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ServiceConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Load the optional file, overlay the environment, validate and resolve.
pub fn load_settings(path: Option<&Path>, source: &dyn ConfigSource) -> Result<Settings, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => ServiceConfig::default(),
    };

    apply_overrides(&mut config, source)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    resolve(config)
}

/// Overlay values from `source` on top of `config`. Source values win.
pub fn apply_overrides(config: &mut ServiceConfig, source: &dyn ConfigSource) -> Result<(), ConfigError> {
    if let Some(name) = lookup(source, SERVICE_NAME) {
        config.service.name = name;
    }
    if let Some(port) = parse_var::<u16>(source, PORT)? {
        config.listener.port = Some(port);
    }
    if let Some(max) = parse_var::<usize>(source, MAX_CONNECTIONS)? {
        config.listener.max_connections = max;
    }
    if let Some(secs) = parse_var::<u64>(source, REQUEST_TIMEOUT_SECS)? {
        config.listener.request_timeout_secs = secs;
    }
    if let Some(url) = lookup(source, NATS_URL) {
        config.messaging.url = Some(url);
    }
    if let Some(subjects) = lookup(source, NATS_SUBJECTS) {
        config.messaging.subjects = subjects
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    if let Some(group) = lookup(source, NATS_QUEUE_GROUP) {
        config.messaging.queue_group = Some(group);
    }
    if let Some(ms) = parse_var::<u64>(source, SHUTDOWN_GRACE_MS)? {
        config.shutdown.grace_period_ms = ms;
    }
    if let Some(level) = lookup(source, LOG_LEVEL) {
        config.observability.log_level = level;
    }
    if let Some(format) = lookup(source, LOG_FORMAT) {
        config.observability.log_format = format;
    }
    if let Some(addr) = lookup(source, METRICS_ADDR) {
        config.observability.metrics_address = addr;
        config.observability.metrics_enabled = true;
    }
    Ok(())
}

/// Turn a validated config into [`Settings`], failing on required values that
/// are still absent.
pub fn resolve(config: ServiceConfig) -> Result<Settings, ConfigError> {
    let port = config.listener.port.ok_or(ConfigError::Missing { name: PORT })?;
    let raw_url = config
        .messaging
        .url
        .clone()
        .ok_or(ConfigError::Missing { name: NATS_URL })?;
    let url = parse_messaging_url(&raw_url)?;

    let host: IpAddr = config.listener.host.parse().map_err(|e: std::net::AddrParseError| {
        ConfigError::Malformed {
            name: "listener.host",
            value: config.listener.host.clone(),
            reason: e.to_string(),
        }
    })?;

    Ok(Settings {
        listen_addr: SocketAddr::new(host, port),
        max_connections: config.listener.max_connections,
        request_timeout: Duration::from_secs(config.listener.request_timeout_secs),
        messaging: MessagingSettings {
            url,
            client_name: config.service.name.clone(),
            subjects: config.messaging.subjects,
            queue_group: config.messaging.queue_group,
            connect_timeout: Duration::from_secs(config.messaging.connect_timeout_secs),
        },
        grace_period: Duration::from_millis(config.shutdown.grace_period_ms),
        service_name: config.service.name,
        observability: config.observability,
    })
}

fn parse_messaging_url(raw: &str) -> Result<Url, ConfigError> {
    let malformed = |reason: String| ConfigError::Malformed {
        name: NATS_URL,
        value: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| malformed(e.to_string()))?;
    match url.scheme() {
        "ws" => {}
        other => return Err(malformed(format!("unsupported scheme '{}', expected ws", other))),
    }
    if url.host_str().is_none() {
        return Err(malformed("missing host".to_string()));
    }
    Ok(url)
}

fn lookup(source: &dyn ConfigSource, name: &'static str) -> Option<String> {
    source
        .lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T>(source: &dyn ConfigSource, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(source, name) {
        None => Ok(None),
        Some(value) => value.parse().map(Some).map_err(|e: T::Err| ConfigError::Malformed {
            name,
            reason: e.to_string(),
            value,
        }),
    }
}
