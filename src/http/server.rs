//! HTTP listener activity.
//!
//! # Responsibilities
//! - Bind the listen address (or take an already bound listener)
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve HTTP/1.1 and HTTP/2 on accepted connections
//! - On close: stop accepting, let accepted connections finish
//!
//! # Design Decisions
//! - The routing table is opaque here; callers hand in a `Router`
//! - Backpressure comes from the bounded listener, not from rejection
//! - Accept errors end the activity; there is no retry
//! - Serves with hyper-util rather than `axum::serve`, which takes a plain
//!   `TcpListener`. Accepts go through `BoundedListener`, and each connection
//!   holds its semaphore permit and tracker guard until it finishes, so the
//!   drain on close waits for exactly those connections

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::{extract::ConnectInfo, http::Request, Router};
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use tower::Service;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::lifecycle::activity::ListenerActivity;
use crate::lifecycle::shutdown::ShutdownSignal;
use crate::net::{BoundedListener, ConnectionTracker, ListenerError};

enum Endpoint {
    Unbound(SocketAddr),
    Bound(BoundedListener),
}

/// Serves a router until closed or faulted.
pub struct HttpListener {
    endpoint: Endpoint,
    router: Router,
    max_connections: usize,
    tracker: ConnectionTracker,
}

impl HttpListener {
    /// A listener that binds `addr` when it starts serving.
    pub fn new(addr: SocketAddr, max_connections: usize, request_timeout: Duration, routes: Router) -> Self {
        Self {
            endpoint: Endpoint::Unbound(addr),
            router: build_router(routes, request_timeout),
            max_connections,
            tracker: ConnectionTracker::new(),
        }
    }

    /// A listener that serves on an already bound socket.
    pub fn bound(listener: BoundedListener, request_timeout: Duration, routes: Router) -> Self {
        Self {
            max_connections: listener.max_connections(),
            endpoint: Endpoint::Bound(listener),
            router: build_router(routes, request_timeout),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Share an existing tracker (e.g. with the health route).
    pub fn with_tracker(mut self, tracker: ConnectionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }
}

/// Wrap `routes` in the middleware stack.
#[allow(deprecated)]
pub fn build_router(routes: Router, request_timeout: Duration) -> Router {
    routes
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[async_trait]
impl ListenerActivity for HttpListener {
    async fn serve(self: Box<Self>, mut close: ShutdownSignal) -> Result<(), ListenerError> {
        let HttpListener {
            endpoint,
            router,
            max_connections,
            tracker,
        } = *self;

        let listener = match endpoint {
            Endpoint::Bound(listener) => listener,
            Endpoint::Unbound(addr) => BoundedListener::bind(addr, max_connections).await?,
        };
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %local_addr, "HTTP listener serving");

        let builder = auto::Builder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                () = close.requested() => break,
                accepted = listener.accept() => {
                    let (stream, peer_addr, permit) = accepted?;
                    let guard = tracker.track();
                    let router = router.clone();

                    let service = hyper::service::service_fn(move |mut request: Request<Incoming>| {
                        request.extensions_mut().insert(ConnectInfo(peer_addr));
                        router.clone().call(request)
                    });

                    let conn = builder
                        .serve_connection_with_upgrades(TokioIo::new(stream), service)
                        .into_owned();
                    let conn = graceful.watch(conn);

                    tokio::spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(peer_addr = %peer_addr, connection = %guard.id(), error = %e, "Connection ended with error");
                        }
                        drop(guard);
                        drop(permit);
                    });
                }
            }
        }

        // Stop accepting before waiting on the connections already accepted.
        drop(listener);
        tracing::info!(in_flight = tracker.active_count(), "HTTP listener draining");
        graceful.shutdown().await;
        tracing::info!(address = %local_addr, "HTTP listener stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, routing::get};
    use tower::ServiceExt;

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let router = build_router(Router::new().route("/", get(|| async { "ok" })), Duration::from_secs(5));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), 200);
        let id = response.headers().get("x-request-id").expect("request id header");
        assert!(uuid::Uuid::parse_str(id.to_str().unwrap()).is_ok());
    }

    #[tokio::test]
    async fn incoming_request_id_is_kept() {
        let router = build_router(Router::new().route("/", get(|| async { "ok" })), Duration::from_secs(5));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-request-id", "abc-123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }
}
