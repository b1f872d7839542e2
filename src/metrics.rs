//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener (default port 9090).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gate_decisions_total` - Session gate outcomes (labels: class, action)
//! - `rate_limit_decisions_total` - Rate limiter outcomes (label: outcome)
//! - `rate_store_errors_total` - Failed store commands (label: command)
//!
//! ## Histograms
//! - `rate_store_duration_seconds` - Store command latency (label: command)
//!
//! ## Gauges
//! - `rate_store_up` - Store connectivity from the background ping (1 = up, 0 = down)
//!
//! Recording functions are no-ops until a recorder is installed, so tests and
//! metric-less deployments can call them freely.

use std::net::SocketAddr;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const GATE_DECISIONS_TOTAL: &str = "gate_decisions_total";
    pub const RATE_LIMIT_DECISIONS_TOTAL: &str = "rate_limit_decisions_total";
    pub const RATE_STORE_ERRORS_TOTAL: &str = "rate_store_errors_total";
    pub const RATE_STORE_DURATION_SECONDS: &str = "rate_store_duration_seconds";
    pub const RATE_STORE_UP: &str = "rate_store_up";
}

/// Initialize the Prometheus metrics exporter.
///
/// Sets up metric descriptions and starts the Prometheus HTTP listener on
/// `metrics_addr`.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::GATE_DECISIONS_TOTAL,
        "Session gate decisions by route class and action"
    );
    describe_counter!(
        names::RATE_LIMIT_DECISIONS_TOTAL,
        "Rate limiter decisions (allowed, limited, fail_open)"
    );
    describe_counter!(
        names::RATE_STORE_ERRORS_TOTAL,
        "Rate store commands that returned an error"
    );
    describe_histogram!(
        names::RATE_STORE_DURATION_SECONDS,
        "Rate store command duration in seconds"
    );
    describe_gauge!(
        names::RATE_STORE_UP,
        "Rate store connectivity (1 = up, 0 = down)"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a session gate decision.
pub fn record_gate_decision(class: &'static str, action: &'static str) {
    counter!(names::GATE_DECISIONS_TOTAL, "class" => class, "action" => action).increment(1);
}

/// Record a rate limiter decision.
pub fn record_rate_limit_decision(outcome: &'static str) {
    counter!(names::RATE_LIMIT_DECISIONS_TOTAL, "outcome" => outcome).increment(1);
}

/// Record a failed store command.
pub fn record_store_error(command: &'static str) {
    counter!(names::RATE_STORE_ERRORS_TOTAL, "command" => command).increment(1);
}

/// Record store command latency.
pub fn record_store_duration(command: &'static str, duration_secs: f64) {
    histogram!(names::RATE_STORE_DURATION_SECONDS, "command" => command).record(duration_secs);
}

/// Update the store connectivity gauge.
pub fn set_store_up(up: bool) {
    gauge!(names::RATE_STORE_UP).set(if up { 1.0 } else { 0.0 });
}
