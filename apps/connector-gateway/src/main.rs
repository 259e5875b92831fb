//! Connector Gateway Binary
//!
//! Starts the IBKR connector front-end.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin connector-gateway
//! ```
//!
//! # Environment Variables
//!
//! All optional:
//! - `IBKR_BACKEND_URL`: Connector backend base URL (default: <http://localhost:5000>)
//! - `HEARTBEAT_POLL_INTERVAL_SECS`: Wait between polls (default: 30)
//! - `HEARTBEAT_REQUEST_TIMEOUT_SECS`: Per-request timeout (default: 5)
//! - `HEARTBEAT_MAX_CONSECUTIVE_FAILURES`: Failures before monitoring stops (default: 3)
//! - `GATEWAY_HTTP_PORT`: API, SSE, health and metrics port (default: 8080)
//! - `GATEWAY_EVENTS_CAPACITY`: Status event buffer per subscriber (default: 256)
//! - `GATEWAY_AUTO_CONNECT`: Connect to the backend at startup (default: true)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `OTEL_SERVICE_NAME`: Service name (default: connector-gateway)
//! - `LOG_FORMAT`: pretty | json (default: pretty)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use connector_gateway::infrastructure::telemetry;
use connector_gateway::{
    BroadcastConfig, BroadcastHub, ConnectionStateStore, ConnectionSupervisor,
    ConnectivityMonitor, GatewayConfig, HttpBackendClient, HttpServer, HttpServerState,
    MonitorConfig, StatusPublisher, init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Connector Gateway");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = GatewayConfig::from_env().context("invalid gateway configuration")?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let broadcast_hub = Arc::new(BroadcastHub::new(BroadcastConfig::from(
        config.broadcast.clone(),
    )));

    let backend = HttpBackendClient::new(
        &config.backend.base_url,
        config.heartbeat.request_timeout,
    )
    .context("failed to create backend client")?;

    let publisher = Arc::clone(&broadcast_hub) as Arc<dyn StatusPublisher>;
    let state = Arc::new(ConnectionStateStore::new());
    let monitor = Arc::new(ConnectivityMonitor::new(
        MonitorConfig::from_heartbeat_settings(&config.heartbeat),
        Arc::clone(&state),
        Arc::new(backend),
        publisher,
    ));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        monitor,
        state,
        shutdown_token.clone(),
    ));

    let http_state = Arc::new(HttpServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&supervisor),
        Arc::clone(&broadcast_hub),
    ));
    let http_server = HttpServer::new(config.server.http_port, http_state, shutdown_token.clone());

    let server_task = tokio::spawn(async move {
        if let Err(e) = http_server.run().await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    if config.auto_connect {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = supervisor.connect().await {
                tracing::warn!(error = %e, "Startup connect failed, waiting for explicit connect");
            }
        });
    }

    tracing::info!("Connector gateway ready");

    await_shutdown(shutdown_token).await;

    supervisor.disconnect();
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, server_task).await.is_err() {
        tracing::warn!("HTTP server did not stop within the shutdown timeout");
    }

    tracing::info!("Connector gateway stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &GatewayConfig) {
    tracing::info!(
        backend_url = %config.backend.base_url,
        http_port = config.server.http_port,
        auto_connect = config.auto_connect,
        "Configuration loaded"
    );
    tracing::debug!(
        poll_interval_secs = config.heartbeat.poll_interval.as_secs(),
        request_timeout_secs = config.heartbeat.request_timeout.as_secs(),
        max_consecutive_failures = config.heartbeat.max_consecutive_failures,
        events_capacity = config.broadcast.status_events_capacity,
        "Heartbeat settings"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
