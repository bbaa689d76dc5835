//! Startup orchestration (composition root).
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order from resolved `Settings`
//! - Install OS signal forwarding
//! - Run the orchestrator and release the store afterwards
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The store outlives the orchestrator and is closed exactly once

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::{ConfigError, Settings};
use crate::http::{default_routes, HttpListener};
use crate::lifecycle::activity::ListenerActivity;
use crate::lifecycle::orchestrator::{GraceWindow, InterruptHandle, Orchestrator, ServiceOutcome};
use crate::lifecycle::signals;
use crate::messaging::{subscriptions_for, BrokerError, LoggingHandler, MessageBroker, NatsBroker};
use crate::net::ConnectionTracker;
use crate::observability::{metrics, EventSink, TracingSink};
use crate::store::{MemoryStore, StoreConnection, StoreError};

/// Errors that stop the service before it reaches `Running`.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Message broker unavailable: {0}")]
    Broker(#[from] BrokerError),

    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to install signal handlers: {0}")]
    Signals(#[source] io::Error),

    #[error("Failed to start metrics exporter: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
}

/// Everything the orchestrator run needs, built once at startup.
pub struct Dependencies {
    pub grace: GraceWindow,
    pub store: Arc<dyn StoreConnection>,
    pub broker: Arc<dyn MessageBroker>,
    pub listener: Box<dyn ListenerActivity>,
    pub sink: Arc<dyn EventSink>,
}

/// Build the production collaborators: metrics, store, broker, listener.
pub async fn build_dependencies(settings: &Settings) -> Result<Dependencies, StartupError> {
    let observability = &settings.observability;
    if observability.metrics_enabled {
        let addr: SocketAddr = observability
            .metrics_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Malformed {
                name: "observability.metrics_address",
                value: observability.metrics_address.clone(),
                reason: e.to_string(),
            })?;
        metrics::init_metrics(addr)?;
    }

    let store: Arc<dyn StoreConnection> = Arc::new(MemoryStore::open(settings.service_name.clone()));

    let subscriptions = subscriptions_for(&settings.messaging, Arc::new(LoggingHandler));
    let broker = match NatsBroker::connect(&settings.messaging, subscriptions).await {
        Ok(broker) => broker,
        Err(e) => {
            if let Err(close_error) = store.close().await {
                tracing::warn!(error = %close_error, "Store close failed after broker error");
            }
            return Err(e.into());
        }
    };

    let tracker = ConnectionTracker::new();
    let routes = default_routes(Arc::clone(&store), tracker.clone());
    let listener = HttpListener::new(
        settings.listen_addr,
        settings.max_connections,
        settings.request_timeout,
        routes,
    )
    .with_tracker(tracker);

    tracing::info!(
        service = %settings.service_name,
        listen_addr = %settings.listen_addr,
        grace_ms = settings.grace_period.as_millis() as u64,
        "Dependencies initialized"
    );

    Ok(Dependencies {
        grace: GraceWindow::new(settings.grace_period),
        store,
        broker: Arc::new(broker),
        listener: Box::new(listener),
        sink: Arc::new(TracingSink::new(settings.service_name.clone())),
    })
}

/// Run the service with OS signals wired in, until it terminates.
pub async fn run(deps: Dependencies) -> Result<ServiceOutcome, StartupError> {
    run_with_signals(deps, signals::listen).await
}

async fn run_with_signals<F>(deps: Dependencies, listen: F) -> Result<ServiceOutcome, StartupError>
where
    F: FnOnce(InterruptHandle) -> io::Result<JoinHandle<()>>,
{
    let Dependencies {
        grace,
        store,
        broker,
        listener,
        sink,
    } = deps;

    let orchestrator = Orchestrator::new(listener, Arc::clone(&broker), grace, sink);
    let forwarder = match listen(orchestrator.interrupt_handle()) {
        Ok(forwarder) => forwarder,
        Err(e) => {
            broker.close();
            if let Err(close_error) = store.close().await {
                tracing::warn!(error = %close_error, "Store close failed after signal setup error");
            }
            return Err(StartupError::Signals(e));
        }
    };

    let outcome = run_scoped(orchestrator, store).await;
    forwarder.abort();
    Ok(outcome)
}

/// Run `orchestrator` to completion, then close `store`.
pub async fn run_scoped(orchestrator: Orchestrator, store: Arc<dyn StoreConnection>) -> ServiceOutcome {
    let outcome = orchestrator.run().await;
    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "Store close failed");
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::lifecycle::shutdown::ShutdownSignal;
    use crate::net::ListenerError;
    use crate::observability::MemorySink;

    #[derive(Default)]
    struct CountingBroker {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl MessageBroker for CountingBroker {
        async fn run(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Idle;

    #[async_trait]
    impl ListenerActivity for Idle {
        async fn serve(self: Box<Self>, mut close: ShutdownSignal) -> Result<(), ListenerError> {
            close.requested().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn signal_setup_failure_releases_store_and_broker() {
        let store = Arc::new(MemoryStore::open("test"));
        let broker = Arc::new(CountingBroker::default());
        let deps = Dependencies {
            grace: GraceWindow::default(),
            store: store.clone(),
            broker: broker.clone(),
            listener: Box::new(Idle),
            sink: Arc::new(MemorySink::new()),
        };

        let result = run_with_signals(deps, |_| Err(io::Error::other("no signal driver"))).await;

        assert!(matches!(result, Err(StartupError::Signals(_))));
        assert!(!store.is_open());
        assert_eq!(broker.closes.load(Ordering::SeqCst), 1);
    }
}
