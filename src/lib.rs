//! auth-service library: process lifecycle orchestration for an HTTP
//! listener running alongside a message subscription loop.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod messaging;
pub mod net;
pub mod observability;
pub mod store;

pub use config::Settings;
pub use http::HttpListener;
pub use lifecycle::{Orchestrator, ServiceOutcome, Shutdown};
pub use messaging::NatsBroker;
