//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// HTTP client for the connector backend.
pub mod backend;

/// Broadcast channel adapter for status event distribution.
pub mod broadcast;

/// Environment configuration.
pub mod config;

/// HTTP API, event stream and health endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
