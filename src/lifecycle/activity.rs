//! The two concurrent activities the orchestrator supervises.
//!
//! # Responsibilities
//! - Define the listener seam (`ListenerActivity`)
//! - Spawn each activity as its own task
//! - Report an activity that ends on its own onto the fan-in channel
//!
//! # Design Decisions
//! - Panics are caught and turned into errors so a dead activity is never silent
//! - Reports use `try_send`; a producer never waits on the orchestrator
//! - The listener's result always goes back through the join handle. While
//!   `Running` a copy of a fault is also posted, since the orchestrator may
//!   already have taken its one signal and never read it

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::lifecycle::orchestrator::{Phase, TerminationSignal};
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::messaging::{BrokerError, MessageBroker};
use crate::net::ListenerError;

/// Serves inbound requests until closed or faulted.
#[async_trait]
pub trait ListenerActivity: Send {
    /// Serve until `close` is requested, then stop accepting, let accepted
    /// connections finish and return `Ok(())`.
    ///
    /// Any error is terminal; the activity does not retry.
    async fn serve(self: Box<Self>, close: ShutdownSignal) -> Result<(), ListenerError>;
}

pub(crate) fn spawn_listener(
    listener: Box<dyn ListenerActivity>,
    close: ShutdownSignal,
    fan_in: mpsc::Sender<TerminationSignal>,
    phase: watch::Receiver<Phase>,
) -> JoinHandle<Result<(), ListenerError>> {
    tokio::spawn(async move {
        let result = AssertUnwindSafe(listener.serve(close))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ListenerError::Panicked(panic_message(panic))));

        if *phase.borrow() != Phase::Running {
            return result;
        }

        let error = result.err().unwrap_or(ListenerError::Stopped);
        tracing::error!(error = %error, "Listener ended before shutdown was requested");
        if fan_in.try_send(TerminationSignal::ListenerError(error.duplicate())).is_err() {
            tracing::debug!("Listener fault not delivered, orchestrator already terminating");
        }
        Err(error)
    })
}

pub(crate) fn spawn_subscriber(
    broker: Arc<dyn MessageBroker>,
    fan_in: mpsc::Sender<TerminationSignal>,
    phase: watch::Receiver<Phase>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let result = AssertUnwindSafe(broker.run())
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(BrokerError::Panicked(panic_message(panic))));
        let running = *phase.borrow() == Phase::Running;

        match result {
            Ok(()) if running => {
                tracing::warn!("Subscription loop returned before shutdown was requested");
            }
            Ok(()) => tracing::debug!("Subscription loop finished"),
            Err(error) if running => {
                tracing::error!(error = %error, "Subscription loop failed");
                if fan_in.try_send(TerminationSignal::SubscriberError(error)).is_err() {
                    tracing::debug!("Subscriber fault not delivered, orchestrator already terminating");
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "Subscription loop failed during shutdown");
            }
        }
    })
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
