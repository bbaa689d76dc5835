//! Persistent store connection.
//!
//! The orchestrator never talks to the store. The composition root opens it
//! before anything starts and closes it once after the orchestrator returns;
//! the health endpoint only asks whether it is still open.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;

/// Error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store connection is closed")]
    Closed,
}

/// A handle to the persistent store.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    fn is_open(&self) -> bool;

    /// Release the connection. Closing twice is an error, not a panic.
    async fn close(&self) -> Result<(), StoreError>;
}

/// In-process store used until a real backend is wired in.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    open: AtomicBool,
}

impl MemoryStore {
    pub fn open(name: impl Into<String>) -> Self {
        let name = name.into();
        tracing::info!(store = %name, "Store connection opened");
        Self {
            name,
            open: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryStore {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<(), StoreError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        tracing::info!(store = %self.name, "Store connection closed");
        Ok(())
    }
}
