//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::BoundedListener)
//!     → server.rs (hyper-util auto builder, HTTP/1.1 + HTTP/2)
//!     → middleware (request ID, trace, timeout)
//!     → routing table (health.rs by default)
//!     → Send to client
//! ```

pub mod health;
pub mod server;

pub use health::{default_routes, HealthStatus};
pub use server::{build_router, HttpListener};
