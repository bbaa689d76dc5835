//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Error type for listener operations.
///
/// Every variant is fatal to the listener activity; nothing is retried.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("Failed to bind: {0}")]
    Bind(#[source] std::io::Error),

    /// Failed to accept connection.
    #[error("Failed to accept: {0}")]
    Accept(#[source] std::io::Error),

    /// The listener returned without being asked to close.
    #[error("Listener stopped unexpectedly")]
    Stopped,

    /// The listener task panicked or was cancelled.
    #[error("Listener task failed: {0}")]
    Panicked(String),
}

impl ListenerError {
    /// A second copy of this error. I/O errors keep their kind and message.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            ListenerError::Bind(e) => ListenerError::Bind(std::io::Error::new(e.kind(), e.to_string())),
            ListenerError::Accept(e) => ListenerError::Accept(std::io::Error::new(e.kind(), e.to_string())),
            ListenerError::Stopped => ListenerError::Stopped,
            ListenerError::Panicked(message) => ListenerError::Panicked(message.clone()),
        }
    }
}

/// A bounded TCP listener that limits concurrent connections.
///
/// Uses a semaphore to enforce `max_connections`. When the limit is reached,
/// new connections wait in the kernel backlog until a slot frees up.
#[derive(Debug)]
pub struct BoundedListener {
    inner: TcpListener,
    connection_limit: Arc<Semaphore>,
    max_connections: usize,
}

impl BoundedListener {
    /// Bind to `addr` with the given connection limit.
    pub async fn bind(addr: SocketAddr, max_connections: usize) -> Result<Self, ListenerError> {
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            max_connections,
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// Returns the stream and a permit that must be held for the connection's
    /// lifetime. Cancel safe: a permit acquired before cancellation is dropped.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Accept(std::io::Error::other("connection limit closed")))?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Get current available connection slots.
    pub fn available_permits(&self) -> usize {
        self.connection_limit.available_permits()
    }

    /// Get configured maximum connections.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

/// A permit representing a connection slot.
///
/// When dropped, the connection slot is released back to the pool.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_released_on_drop() {
        let listener = BoundedListener::bind("127.0.0.1:0".parse().unwrap(), 2)
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();

        let _client = TcpStream::connect(addr).await.unwrap();
        let (_stream, _, permit) = listener.accept().await.unwrap();
        assert_eq!(listener.available_permits(), 1);

        drop(permit);
        assert_eq!(listener.available_permits(), listener.max_connections());
    }

    #[tokio::test]
    async fn bind_conflict_is_bind_error() {
        let first = BoundedListener::bind("127.0.0.1:0".parse().unwrap(), 1)
            .await
            .unwrap();
        let taken = first.local_addr().unwrap();

        let err = BoundedListener::bind(taken, 1).await.unwrap_err();
        assert!(matches!(err, ListenerError::Bind(_)));
    }

    #[test]
    fn duplicate_keeps_kind_and_message() {
        let original = ListenerError::Accept(std::io::Error::new(
            std::io::ErrorKind::ConnectionAborted,
            "peer went away",
        ));

        match original.duplicate() {
            ListenerError::Accept(e) => {
                assert_eq!(e.kind(), std::io::ErrorKind::ConnectionAborted);
                assert_eq!(e.to_string(), "peer went away");
            }
            other => panic!("unexpected copy: {other:?}"),
        }
    }
}
