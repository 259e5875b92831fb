//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Heartbeat**: Poll outcomes, latency and the failure streak
//! - **Connection**: Backend connectivity and monitor run exits
//! - **Push**: Status events published and live SSE clients
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the HTTP server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::domain::connection::ProbeOutcome;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
#[allow(clippy::expect_used)]
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "connector_gateway_heartbeat_polls_total",
        "Heartbeat polls against the connector backend by outcome"
    );
    describe_histogram!(
        "connector_gateway_heartbeat_latency_seconds",
        "Time spent waiting for a heartbeat response"
    );
    describe_gauge!(
        "connector_gateway_consecutive_failures",
        "Failed heartbeat polls since the last success"
    );
    describe_gauge!(
        "connector_gateway_backend_connected",
        "1 when the backend reports an active IBKR session"
    );
    describe_counter!(
        "connector_gateway_monitor_runs_total",
        "Connectivity monitor runs by exit reason"
    );
    describe_counter!(
        "connector_gateway_status_events_published_total",
        "connection_status events published to subscribers"
    );
    describe_gauge!(
        "connector_gateway_sse_clients",
        "Open Server-Sent-Event client streams"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record the outcome and latency of one heartbeat poll.
pub fn record_heartbeat_poll(outcome: &ProbeOutcome, latency: Duration) {
    counter!(
        "connector_gateway_heartbeat_polls_total",
        "outcome" => outcome.label()
    )
    .increment(1);
    histogram!("connector_gateway_heartbeat_latency_seconds").record(latency.as_secs_f64());
}

/// Update the failure streak gauge.
pub fn set_consecutive_failures(count: u32) {
    gauge!("connector_gateway_consecutive_failures").set(f64::from(count));
}

/// Update the backend connectivity gauge.
pub fn set_backend_connected(connected: bool) {
    gauge!("connector_gateway_backend_connected").set(if connected { 1.0 } else { 0.0 });
}

/// Record how a monitor run ended.
pub fn record_monitor_exit(exit: &'static str) {
    counter!(
        "connector_gateway_monitor_runs_total",
        "exit" => exit
    )
    .increment(1);
}

/// Record a published status event.
pub fn record_status_event_published(success: bool) {
    counter!(
        "connector_gateway_status_events_published_total",
        "success" => if success { "true" } else { "false" }
    )
    .increment(1);
}

/// Track an SSE client stream opening.
pub fn sse_client_opened() {
    gauge!("connector_gateway_sse_clients").increment(1.0);
}

/// Track an SSE client stream closing.
pub fn sse_client_closed() {
    gauge!("connector_gateway_sse_clients").decrement(1.0);
}
