//! Messaging subsystem.
//!
//! # Data Flow
//! ```text
//! NATS_URL (ws://)
//!     → client.rs (WebSocket upgrade, INFO/CONNECT/PING handshake)
//!     → client.rs run loop (SUB per subscription)
//!     → protocol.rs Decoder (frames → operations)
//!     → handler.rs (MessageHandler per subscription)
//!     → optional reply PUB
//! ```
//!
//! # Design Decisions
//! - The orchestrator sees only [`MessageBroker`]; it never touches the socket
//! - The only way to stop the loop is `close`

pub mod client;
pub mod handler;
pub mod protocol;
pub mod types;

use async_trait::async_trait;

pub use client::{subscriptions_for, NatsBroker, Subscription};
pub use handler::{LoggingHandler, MessageHandler};
pub use types::{BrokerError, Message, ServerInfo};

/// A messaging client that runs a subscription loop until told to stop.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Run the consume loop. Returns `Ok(())` once `close` was requested and
    /// the loop wound down, or the error that ended it.
    async fn run(&self) -> Result<(), BrokerError>;

    /// Ask the loop to stop. Idempotent and non-blocking.
    fn close(&self);
}
