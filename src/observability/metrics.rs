//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_active_connections` (gauge): in-flight listener connections
//! - `service_messages_received_total` (counter): messages by subject
//! - `service_terminations_total` (counter): orchestrator outcomes by label
//!
//! Recording is a no-op until an exporter is installed, so tests never need
//! to set one up.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with its own scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn connection_opened() {
    metrics::gauge!("service_active_connections").increment(1.0);
}

pub fn connection_closed() {
    metrics::gauge!("service_active_connections").decrement(1.0);
}

pub fn record_message(subject: &str) {
    metrics::counter!("service_messages_received_total", "subject" => subject.to_string()).increment(1);
}

pub fn record_termination(outcome: &'static str) {
    metrics::counter!("service_terminations_total", "outcome" => outcome).increment(1);
}
