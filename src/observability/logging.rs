//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber (pretty or JSON)
//! - Provide the `EventSink` capability handed to the orchestrator
//!
//! # Design Decisions
//! - `RUST_LOG` wins over the configured level when set
//! - The orchestrator never logs through globals directly; it gets a sink

use std::fmt;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global tracing subscriber.
///
/// Calling this more than once is harmless; later calls are ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("auth_service={level},tower_http={level}", level = config.log_level).into()
    });
    let json = config.log_format == "json";

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .try_init();
}

/// A leveled, key-value diagnostic event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    pub level: Level,
    pub message: &'static str,
    pub fields: Vec<(&'static str, String)>,
}

impl LogEvent {
    pub fn new(level: Level, message: &'static str) -> Self {
        Self {
            level,
            message,
            fields: Vec::new(),
        }
    }

    pub fn info(message: &'static str) -> Self {
        Self::new(Level::INFO, message)
    }

    pub fn warn(message: &'static str) -> Self {
        Self::new(Level::WARN, message)
    }

    pub fn error(message: &'static str) -> Self {
        Self::new(Level::ERROR, message)
    }

    /// Attach a key-value pair.
    pub fn field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    /// Value of the first field named `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Sink for lifecycle events. Fire-and-forget.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LogEvent);
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    service: String,
}

impl TracingSink {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

/// Keys the orchestrator emits. Each becomes its own `tracing` field so the
/// JSON formatter keeps them structured; anything else lands in `extra`.
const KNOWN_KEYS: [&str; 5] = ["signal", "grace_ms", "outcome", "error", "reason"];

macro_rules! emit_at {
    ($level:expr, $service:expr, $event:expr, $extra:expr) => {
        tracing::event!(
            $level,
            service = $service,
            signal = $event.get("signal"),
            grace_ms = $event.get("grace_ms"),
            outcome = $event.get("outcome"),
            error = $event.get("error"),
            reason = $event.get("reason"),
            extra = $extra,
            "{}",
            $event.message
        )
    };
}

impl EventSink for TracingSink {
    fn emit(&self, event: LogEvent) {
        let extra = event
            .fields
            .iter()
            .filter(|(k, _)| !KNOWN_KEYS.contains(k))
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        let extra = (!extra.is_empty()).then_some(extra.as_str());
        let service = self.service.as_str();

        if event.level == Level::ERROR {
            emit_at!(Level::ERROR, service, event, extra);
        } else if event.level == Level::WARN {
            emit_at!(Level::WARN, service, event, extra);
        } else if event.level == Level::INFO {
            emit_at!(Level::INFO, service, event, extra);
        } else if event.level == Level::DEBUG {
            emit_at!(Level::DEBUG, service, event, extra);
        } else {
            emit_at!(Level::TRACE, service, event, extra);
        }
    }
}

/// Keeps events in memory. Used by tests to assert on what was logged.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<LogEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<LogEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn messages(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.message).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: LogEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
