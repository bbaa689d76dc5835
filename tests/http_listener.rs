//! The real HTTP listener under the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};

use auth_service::http::{default_routes, HealthStatus, HttpListener};
use auth_service::lifecycle::{GraceWindow, InterruptKind, Orchestrator, Phase, ServiceOutcome};
use auth_service::net::{BoundedListener, ConnectionTracker, ListenerError};
use auth_service::observability::MemorySink;
use auth_service::store::{MemoryStore, StoreConnection};

mod common;

use common::{BrokerBehavior, FakeBroker};

async fn bind_local() -> BoundedListener {
    BoundedListener::bind("127.0.0.1:0".parse().unwrap(), 16).await.unwrap()
}

#[tokio::test]
async fn test_in_flight_request_completes_before_clean_exit() {
    let listener = bind_local().await;
    let addr = listener.local_addr().unwrap();
    let routes = Router::new().route(
        "/slow",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(300)).await;
            "done"
        }),
    );
    let http = HttpListener::bound(listener, Duration::from_secs(5), routes);
    let broker = FakeBroker::new(BrokerBehavior::UntilClosed);
    let orchestrator = Orchestrator::new(
        Box::new(http),
        broker.clone(),
        GraceWindow::new(Duration::from_secs(2)),
        Arc::new(MemorySink::new()),
    );
    let handle = orchestrator.interrupt_handle();
    let mut phase = orchestrator.phase();
    let run = tokio::spawn(orchestrator.run());
    phase.wait_for(|p| *p == Phase::Running).await.unwrap();

    let request = tokio::spawn(async move { reqwest::get(format!("http://{}/slow", addr)).await });
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.interrupt(InterruptKind::Terminate);

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.text().await.unwrap(), "done");

    let outcome = run.await.unwrap();
    assert!(matches!(outcome, ServiceOutcome::Clean), "got {outcome}");
    assert_eq!(broker.close_count(), 1);

    // No longer accepting.
    assert!(reqwest::get(format!("http://{}/slow", addr)).await.is_err());
}

#[tokio::test]
async fn test_health_reports_store_and_connections() {
    let listener = bind_local().await;
    let addr = listener.local_addr().unwrap();
    let store = Arc::new(MemoryStore::open("test"));
    let tracker = ConnectionTracker::new();
    let routes = default_routes(store.clone(), tracker.clone());
    let http = HttpListener::bound(listener, Duration::from_secs(5), routes).with_tracker(tracker);
    let orchestrator = Orchestrator::new(
        Box::new(http),
        FakeBroker::new(BrokerBehavior::UntilClosed),
        GraceWindow::default(),
        Arc::new(MemorySink::new()),
    );
    let handle = orchestrator.interrupt_handle();
    let run = tokio::spawn(orchestrator.run());

    let url = format!("http://{}/health", addr);
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    let health: HealthStatus = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.store, "open");
    assert_eq!(health.in_flight, 1);

    store.close().await.unwrap();
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 503);
    let health: HealthStatus = response.json().await.unwrap();
    assert_eq!(health.store, "closed");

    handle.interrupt(InterruptKind::Interrupt);
    assert!(run.await.unwrap().is_clean());
}

#[tokio::test]
async fn test_connection_holds_its_slot_until_done() {
    let listener = BoundedListener::bind("127.0.0.1:0".parse().unwrap(), 1).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let routes = Router::new()
        .route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_millis(400)).await;
                "slow"
            }),
        )
        .route("/fast", get(|| async { "fast" }));
    let http = HttpListener::bound(listener, Duration::from_secs(5), routes);
    let orchestrator = Orchestrator::new(
        Box::new(http),
        FakeBroker::new(BrokerBehavior::UntilClosed),
        GraceWindow::default(),
        Arc::new(MemorySink::new()),
    );
    let handle = orchestrator.interrupt_handle();
    let mut phase = orchestrator.phase();
    let run = tokio::spawn(orchestrator.run());
    phase.wait_for(|p| *p == Phase::Running).await.unwrap();

    // No idle pooling, so the connection closes once the body is read.
    let slow = tokio::spawn(async move {
        let client = reqwest::Client::builder().pool_max_idle_per_host(0).build()?;
        client.get(format!("http://{}/slow", addr)).send().await?.text().await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let fast = tokio::time::timeout(Duration::from_secs(3), reqwest::get(format!("http://{}/fast", addr)))
        .await
        .expect("served once the slot frees up")
        .unwrap();
    assert_eq!(fast.text().await.unwrap(), "fast");
    assert!(
        started.elapsed() >= Duration::from_millis(200),
        "second connection served while the only slot was taken"
    );
    assert_eq!(slow.await.unwrap().unwrap(), "slow");

    handle.interrupt(InterruptKind::Terminate);
    assert!(run.await.unwrap().is_clean());
}

#[tokio::test]
async fn test_bind_failure_is_a_listener_fault() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();
    let http = HttpListener::new(addr, 16, Duration::from_secs(5), Router::new());
    let broker = FakeBroker::new(BrokerBehavior::UntilClosed);
    let orchestrator = Orchestrator::new(
        Box::new(http),
        broker.clone(),
        GraceWindow::default(),
        Arc::new(MemorySink::new()),
    );

    let outcome = tokio::time::timeout(Duration::from_secs(2), orchestrator.run())
        .await
        .expect("bind failure ends the run");

    assert!(
        matches!(outcome, ServiceOutcome::ListenerFault(ListenerError::Bind(_))),
        "got {outcome}"
    );
    assert_eq!(broker.close_count(), 1);
    drop(taken);
}
