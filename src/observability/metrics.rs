//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (sessions, cache effectiveness, relayed bytes)
//! - Optionally expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `proxy_sessions_total` (counter): finished sessions by outcome
//! - `proxy_active_sessions` (gauge): sessions currently running
//! - `proxy_cache_lookups_total` (counter): lookups by result (hit/miss)
//! - `proxy_cache_evictions_total` (counter): entries evicted to make room
//! - `proxy_cache_bytes` / `proxy_cache_entries` (gauge): cache occupancy
//! - `proxy_relayed_bytes_total` (counter): bytes written to clients by source
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed, so library code and tests never need setup

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its HTTP scrape listener.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished session.
pub fn record_session(outcome: &'static str) {
    metrics::counter!("proxy_sessions_total", "outcome" => outcome).increment(1);
}

/// Record the current number of running sessions.
pub fn record_active_sessions(count: u64) {
    metrics::gauge!("proxy_active_sessions").set(count as f64);
}

/// Record a cache lookup result.
pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    metrics::counter!("proxy_cache_lookups_total", "result" => result).increment(1);
}

/// Record entries evicted by one insert.
pub fn record_cache_evictions(count: usize) {
    if count > 0 {
        metrics::counter!("proxy_cache_evictions_total").increment(count as u64);
    }
}

/// Record cache occupancy after a mutation.
pub fn record_cache_size(bytes: usize, entries: usize) {
    metrics::gauge!("proxy_cache_bytes").set(bytes as f64);
    metrics::gauge!("proxy_cache_entries").set(entries as f64);
}

/// Record bytes written to a client.
pub fn record_relayed_bytes(source: &'static str, bytes: usize) {
    metrics::counter!("proxy_relayed_bytes_total", "source" => source).increment(bytes as u64);
}
