//! Metrics collection and exposition.
//!
//! # Metrics
//! - `circuit_breaker_transitions_total` (counter): state changes by breaker, from, to
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `circuit_breaker_calls_total` (counter): call outcomes by breaker
//! - `circuit_breaker_orphaned_calls` (gauge): abandoned calls still running
//! - `gateway_requests_total` (counter): gateway responses by dependency, status
//! - `gateway_request_duration_seconds` (histogram): gateway latency
//!
//! # Design Decisions
//! - Recording is a no-op until a recorder is installed, so the library and
//!   its tests never need an exporter

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::resilience::state::State;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_state_change(breaker: &str, from: State, to: State) {
    metrics::counter!(
        "circuit_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    metrics::gauge!("circuit_breaker_state", "breaker" => breaker.to_string()).set(to.as_gauge());
}

pub fn record_call(breaker: &str, outcome: &'static str) {
    metrics::counter!(
        "circuit_breaker_calls_total",
        "breaker" => breaker.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_orphaned(breaker: &str, orphaned: usize) {
    metrics::gauge!("circuit_breaker_orphaned_calls", "breaker" => breaker.to_string())
        .set(orphaned as f64);
}

pub fn record_request(dependency: &str, status: u16, start: Instant) {
    metrics::counter!(
        "gateway_requests_total",
        "dependency" => dependency.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("gateway_request_duration_seconds", "dependency" => dependency.to_string())
        .record(start.elapsed().as_secs_f64());
}
