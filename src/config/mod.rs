//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! optional config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overlay, env wins)
//!     → validation.rs (semantic checks)
//!     → loader.rs (resolve required values)
//!     → Settings (validated, immutable)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields except the listen port and messaging URL have defaults
//! - Missing or malformed required values are fatal at startup

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_settings, ConfigError, ConfigSource, EnvSource};
pub use schema::{MessagingSettings, ObservabilityConfig, ServiceConfig, Settings};
