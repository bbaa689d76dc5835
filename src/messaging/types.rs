//! Messaging types and error definitions.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// A message delivered on a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub subject: String,
    /// Subscription id the server delivered this on.
    pub sid: u64,
    /// Subject to publish a response to, for request/reply.
    pub reply_to: Option<String>,
    pub payload: Vec<u8>,
}

/// The fields of the server `INFO` we care about.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerInfo {
    pub server_id: String,
    pub server_name: String,
    pub version: String,
    pub max_payload: u64,
}

/// Errors that can occur talking to the message broker.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// WebSocket transport failed.
    #[error("Transport error: {0}")]
    Transport(Box<tokio_tungstenite::tungstenite::Error>),

    /// Connect or handshake did not finish in time.
    #[error("Broker did not respond within {0:?}")]
    Timeout(Duration),

    /// Server did not follow the expected connect sequence.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Malformed protocol data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server reported an error (`-ERR`).
    #[error("Server error: {0}")]
    Server(String),

    /// Connection closed by the server.
    #[error("Connection closed by broker")]
    Closed,

    /// `run` was called while (or after) another call consumed the connection.
    #[error("Subscription loop already running")]
    AlreadyRunning,

    /// The subscription loop panicked.
    #[error("Subscription loop panicked: {0}")]
    Panicked(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for BrokerError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        BrokerError::Transport(Box::new(err))
    }
}
