//! HTTP API, Event Stream and Health Endpoints
//!
//! Single axum server exposing the connection API used by the browser
//! front-end, the `connection_status` event stream, and the operational
//! endpoints used by orchestrators and Prometheus.
//!
//! # Endpoints
//!
//! - `GET /api/connection/status` - Current connection state
//! - `GET /api/connection/verify` - One-off backend verification
//! - `POST /api/connection/connect` - Connect and start monitoring
//! - `POST /api/connection/disconnect` - Disconnect and stop monitoring
//! - `GET /api/events` - Server-sent `connection_status` events
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (backend connected)
//! - `GET /metrics` - Prometheus metrics in text format

mod api;
mod events;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use api::{ConnectResponse, ConnectionStatusResponse, DisconnectResponse};

use crate::application::services::ConnectionSupervisor;
use crate::domain::connection::ConnectionSnapshot;
use crate::infrastructure::broadcast::SharedBroadcastHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Backend connection status.
    pub connection: ConnectionInfo,
    /// Event stream subscribers.
    pub subscribers: SubscriberStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Backend connected and the last poll succeeded.
    Healthy,
    /// Backend connected but recent polls are failing.
    Degraded,
    /// Backend not connected.
    Unhealthy,
}

/// Backend connection summary.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    /// Whether the backend is considered connected.
    pub connected: bool,
    /// Whether a monitor task is running.
    pub monitoring: bool,
    /// Failed polls since the last success.
    pub consecutive_failures: u32,
    /// Failure threshold that stops monitoring.
    pub max_failures: u32,
    /// Time of the last successful heartbeat.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

/// Subscriber statistics.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStatus {
    /// Live receivers on the status channel.
    pub status_receivers: usize,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the HTTP server.
pub struct HttpServerState {
    version: String,
    started_at: Instant,
    supervisor: Arc<ConnectionSupervisor>,
    broadcast_hub: SharedBroadcastHub,
}

impl HttpServerState {
    /// Create new server state.
    #[must_use]
    pub fn new(
        version: String,
        supervisor: Arc<ConnectionSupervisor>,
        broadcast_hub: SharedBroadcastHub,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            supervisor,
            broadcast_hub,
        }
    }
}

/// Build the gateway router.
#[must_use]
pub fn router(state: Arc<HttpServerState>) -> Router {
    Router::new()
        .route("/api/connection/status", get(api::status_handler))
        .route("/api/connection/verify", get(api::verify_handler))
        .route("/api/connection/connect", post(api::connect_handler))
        .route("/api/connection/disconnect", post(api::disconnect_handler))
        .route("/api/events", get(events::events_handler))
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Server
// =============================================================================

/// Gateway HTTP server.
pub struct HttpServer {
    port: u16,
    state: Arc<HttpServerState>,
    cancel: CancellationToken,
}

impl HttpServer {
    /// Create a new HTTP server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HttpServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

// =============================================================================
// Health Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    if state.supervisor.snapshot().connected {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HttpServerState) -> HealthResponse {
    let snapshot = state.supervisor.snapshot();
    let max_failures = state
        .supervisor
        .monitor()
        .config()
        .max_consecutive_failures;

    HealthResponse {
        status: determine_health_status(&snapshot),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection: ConnectionInfo {
            connected: snapshot.connected,
            monitoring: state.supervisor.is_monitoring(),
            consecutive_failures: snapshot.consecutive_failures,
            max_failures,
            last_heartbeat_at: snapshot.last_heartbeat_at,
        },
        subscribers: SubscriberStatus {
            status_receivers: state.broadcast_hub.stats().status_receivers,
        },
    }
}

const fn determine_health_status(snapshot: &ConnectionSnapshot) -> HealthStatus {
    match (snapshot.connected, snapshot.consecutive_failures) {
        (false, _) => HealthStatus::Unhealthy,
        (true, 0) => HealthStatus::Healthy,
        (true, _) => HealthStatus::Degraded,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(connected: bool, consecutive_failures: u32) -> ConnectionSnapshot {
        ConnectionSnapshot {
            connected,
            consecutive_failures,
            ..ConnectionSnapshot::default()
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status_connected() {
        assert_eq!(
            determine_health_status(&snapshot(true, 0)),
            HealthStatus::Healthy
        );
    }

    #[test]
    fn determine_status_failing_polls() {
        assert_eq!(
            determine_health_status(&snapshot(true, 2)),
            HealthStatus::Degraded
        );
    }

    #[test]
    fn determine_status_disconnected() {
        assert_eq!(
            determine_health_status(&snapshot(false, 0)),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            determine_health_status(&snapshot(false, 3)),
            HealthStatus::Unhealthy
        );
    }
}
