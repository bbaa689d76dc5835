//! Default routing table: liveness and readiness.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::net::ConnectionTracker;
use crate::store::StoreConnection;

#[derive(Clone)]
struct HealthState {
    store: Arc<dyn StoreConnection>,
    tracker: ConnectionTracker,
    started: Instant,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub store: String,
    pub in_flight: u64,
    pub uptime_secs: u64,
}

/// Routes served when no other routing table is supplied.
pub fn default_routes(store: Arc<dyn StoreConnection>, tracker: ConnectionTracker) -> Router {
    let state = HealthState {
        store,
        tracker,
        started: Instant::now(),
    };
    Router::new().route("/health", get(health)).with_state(state)
}

async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthStatus>) {
    let open = state.store.is_open();
    let code = if open {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthStatus {
            status: if open { "ok" } else { "degraded" }.to_string(),
            store: if open { "open" } else { "closed" }.to_string(),
            in_flight: state.tracker.active_count(),
            uptime_secs: state.started.elapsed().as_secs(),
        }),
    )
}
