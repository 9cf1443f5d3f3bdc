//! Metrics collection and exposition.
//!
//! # Metrics
//! - `mediator_requests_total` (counter): mediated calls by cache status or error kind
//! - `mediator_request_duration_seconds` (histogram): end-to-end mediation latency
//! - `mediator_rate_limited_total` (counter): calls rejected by the rate limiter
//! - `mediator_upstream_attempts_total` (counter): upstream attempts by outcome
//! - `mediator_breaker_open` (gauge): 1 while the circuit is open
//! - `mediator_inflight_requests` (gauge): deduplicated executions registered
//! - `mediator_store_errors_total` (counter): failed store operations by op
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests quiet

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener on `addr`.
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one mediated call. `outcome` is a cache status or an error kind.
pub fn record_request(outcome: &'static str, start: Instant) {
    counter!("mediator_requests_total", "outcome" => outcome).increment(1);
    histogram!("mediator_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    counter!("mediator_rate_limited_total").increment(1);
}

/// Record one upstream attempt. `outcome` is "success" or an error kind.
pub fn record_upstream_attempt(outcome: &'static str) {
    counter!("mediator_upstream_attempts_total", "outcome" => outcome).increment(1);
}

pub fn record_breaker_open(open: bool) {
    gauge!("mediator_breaker_open").set(if open { 1.0 } else { 0.0 });
}

pub fn record_inflight(count: usize) {
    gauge!("mediator_inflight_requests").set(count as f64);
}

pub fn record_store_error(op: &'static str) {
    counter!("mediator_store_errors_total", "op" => op).increment(1);
}
