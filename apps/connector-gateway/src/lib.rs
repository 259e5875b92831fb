#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! Connector Gateway - IBKR Bridge Front-End
//!
//! A small HTTP service in front of the IBKR connector backend. It polls the
//! backend's heartbeat, keeps a process-wide view of connectivity, and
//! pushes a `connection_status` event to every subscribed browser after
//! each poll.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Connection state and status event types
//!   - `connection`: State store, probe outcomes, status events
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Interfaces for the backend and status fan-out
//!   - `services`: Connectivity monitor and connection supervisor
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `backend`: reqwest client for the connector backend
//!   - `broadcast`: Channel-based status event distribution
//!   - `config`: Environment configuration
//!   - `http`: API, SSE stream, health and metrics endpoints
//!
//! # Data Flow
//!
//! ```text
//!                   GET /heartbeat
//! Connector Backend <────────────── ConnectivityMonitor
//!                                          │ StatusEvent
//!                                          ▼
//!                                    BroadcastHub ──► SSE client 1
//!                                                 ──► SSE client 2
//!                                                 ──► SSE client N
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Connection types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::{
    CONNECTION_STATUS_EVENT, ConnectionCheck, ConnectionSnapshot, ConnectionStateStore,
    ProbeOutcome, SharedConnectionState, StatusEvent,
};

// Application
pub use application::ports::{
    BackendError, BackendProbe, HeartbeatResponse, StatusPublisher, VerifyResponse,
};
pub use application::services::{
    ConnectionSupervisor, ConnectivityMonitor, LoopExit, MonitorConfig, SupervisorError,
};

// Infrastructure config
pub use infrastructure::config::{
    BackendSettings, BroadcastSettings, ConfigError, GatewayConfig, HeartbeatSettings,
    ServerSettings,
};

// Backend client
pub use infrastructure::backend::{BackendClientError, HttpBackendClient};

// HTTP server
pub use infrastructure::http::{HttpServer, HttpServerError, HttpServerState, router};

// Broadcast hub (for integration tests)
pub use infrastructure::broadcast::{
    BroadcastConfig, BroadcastHub, BroadcastStats, SharedBroadcastHub,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
