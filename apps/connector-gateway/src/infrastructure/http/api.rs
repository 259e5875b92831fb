//! Connection API handlers.

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use super::HttpServerState;
use crate::application::services::SupervisorError;
use crate::domain::connection::{CONNECTED_MESSAGE, ConnectionSnapshot};

/// Body of `GET /api/connection/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatusResponse {
    /// Current connection state.
    #[serde(flatten)]
    pub state: ConnectionSnapshot,
    /// Whether a monitor task is running.
    pub monitoring: bool,
}

/// Body of `POST /api/connection/connect`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectResponse {
    /// Whether the gateway is now connected.
    pub connected: bool,
    /// Outcome summary.
    pub message: String,
    /// Connection state after the attempt.
    pub state: ConnectionSnapshot,
}

/// Body of `POST /api/connection/disconnect`.
#[derive(Debug, Clone, Serialize)]
pub struct DisconnectResponse {
    /// Always `false` after a disconnect.
    pub connected: bool,
    /// Whether a running monitor was stopped.
    pub monitor_stopped: bool,
}

pub(super) async fn status_handler(
    State(state): State<Arc<HttpServerState>>,
) -> Json<ConnectionStatusResponse> {
    Json(ConnectionStatusResponse {
        state: state.supervisor.snapshot(),
        monitoring: state.supervisor.is_monitoring(),
    })
}

pub(super) async fn verify_handler(State(state): State<Arc<HttpServerState>>) -> impl IntoResponse {
    Json(state.supervisor.monitor().check_once().await)
}

pub(super) async fn connect_handler(
    State(state): State<Arc<HttpServerState>>,
) -> impl IntoResponse {
    let result = state.supervisor.connect().await;
    let snapshot = state.supervisor.snapshot();

    match result {
        Ok(snapshot) => (
            StatusCode::OK,
            Json(ConnectResponse {
                connected: true,
                message: CONNECTED_MESSAGE.to_string(),
                state: snapshot,
            }),
        ),
        Err(e) => (
            connect_error_status(&e),
            Json(ConnectResponse {
                connected: snapshot.connected,
                message: e.to_string(),
                state: snapshot,
            }),
        ),
    }
}

pub(super) async fn disconnect_handler(
    State(state): State<Arc<HttpServerState>>,
) -> Json<DisconnectResponse> {
    let monitor_stopped = state.supervisor.disconnect();
    Json(DisconnectResponse {
        connected: false,
        monitor_stopped,
    })
}

const fn connect_error_status(error: &SupervisorError) -> StatusCode {
    match error {
        SupervisorError::ReconnectInProgress => StatusCode::CONFLICT,
        SupervisorError::BackendNotConnected { .. } | SupervisorError::BackendUnreachable { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
