//! Connectivity Monitor
//!
//! Polls the connector backend's heartbeat on a fixed interval, keeps the
//! shared connection state current and publishes one `connection_status`
//! event per poll.
//!
//! The loop is a continuation loop: it runs only while the state says the
//! backend is connected and stops on its own once the failure streak
//! reaches the configured threshold. Restarting it is the supervisor's job.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::application::ports::{BackendProbe, StatusPublisher};
use crate::domain::connection::{
    ConnectionCheck, ConnectionSnapshot, ProbeOutcome, SharedConnectionState, StatusEvent,
};
use crate::infrastructure::metrics;

/// Configuration for the monitor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Wait between polls.
    pub poll_interval: Duration,
    /// Upper bound on a single backend request.
    pub request_timeout: Duration,
    /// Failed polls in a row that stop the loop.
    pub max_consecutive_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        poll_interval: Duration,
        request_timeout: Duration,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            poll_interval,
            request_timeout,
            max_consecutive_failures,
        }
    }

    /// Create configuration from `HeartbeatSettings`.
    #[must_use]
    pub const fn from_heartbeat_settings(settings: &crate::HeartbeatSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval,
            request_timeout: settings.request_timeout,
            max_consecutive_failures: settings.max_consecutive_failures,
        }
    }
}

/// Why a monitor loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The failure streak reached the threshold.
    GaveUp {
        /// Failure count at exit.
        consecutive_failures: u32,
    },
    /// The connection state was marked disconnected.
    Disconnected,
    /// The cancellation token fired.
    Cancelled,
}

impl LoopExit {
    /// Metric label for this exit.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GaveUp { .. } => "gave_up",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Heartbeat poller for the connector backend.
pub struct ConnectivityMonitor {
    config: MonitorConfig,
    state: SharedConnectionState,
    backend: Arc<dyn BackendProbe>,
    publisher: Arc<dyn StatusPublisher>,
}

impl ConnectivityMonitor {
    /// Create a new monitor.
    #[must_use]
    pub fn new(
        config: MonitorConfig,
        state: SharedConnectionState,
        backend: Arc<dyn BackendProbe>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            config,
            state,
            backend,
            publisher,
        }
    }

    /// The monitor configuration.
    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Run the polling loop until it gives up, the state is marked
    /// disconnected, or `cancel` fires.
    ///
    /// Both stop conditions are checked between iterations; an in-flight
    /// request is never interrupted except by its own timeout. A result that
    /// arrives after `cancel` fired is dropped without touching the state.
    pub async fn run_loop(&self, cancel: CancellationToken) -> LoopExit {
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            timeout_secs = self.config.request_timeout.as_secs(),
            max_failures = self.config.max_consecutive_failures,
            "Connectivity monitor started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::debug!("Connectivity monitor cancelled");
                return LoopExit::Cancelled;
            }
            if !self.state.is_connected() {
                tracing::info!("Connection marked disconnected, stopping monitor");
                return LoopExit::Disconnected;
            }

            let Some(snapshot) = self.poll(&cancel).await else {
                tracing::debug!("Connectivity monitor cancelled during a poll, result dropped");
                return LoopExit::Cancelled;
            };

            if snapshot.consecutive_failures >= self.config.max_consecutive_failures {
                tracing::warn!(
                    consecutive_failures = snapshot.consecutive_failures,
                    max_failures = self.config.max_consecutive_failures,
                    "Backend unreachable, giving up heartbeat monitoring until reconnect"
                );
                return LoopExit::GaveUp {
                    consecutive_failures: snapshot.consecutive_failures,
                };
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!("Connectivity monitor cancelled");
                    return LoopExit::Cancelled;
                }
                () = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Wait one poll interval, then run the polling loop.
    ///
    /// Used right after a successful connect, whose own heartbeat already
    /// counts as the first poll.
    pub async fn run_after_interval(&self, cancel: CancellationToken) -> LoopExit {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!("Connectivity monitor cancelled before its first poll");
                LoopExit::Cancelled
            }
            () = tokio::time::sleep(self.config.poll_interval) => self.run_loop(cancel).await,
        }
    }

    /// Issue one heartbeat request, bounded by the request timeout.
    pub async fn probe_heartbeat(&self) -> ProbeOutcome {
        let timeout = self.config.request_timeout;
        match tokio::time::timeout(timeout, self.backend.heartbeat()).await {
            Ok(Ok(response)) if response.is_alive() && response.connected_to_ibkr => {
                ProbeOutcome::Connected
            }
            Ok(Ok(response)) => ProbeOutcome::ReportedDisconnected {
                error: response.error,
            },
            Ok(Err(e)) => ProbeOutcome::TransportFailed {
                error: e.to_string(),
            },
            Err(_) => ProbeOutcome::TimedOut { after: timeout },
        }
    }

    /// Perform a single verification against the backend.
    ///
    /// Never fails: faults are reported as `connected: false,
    /// verified: false` with the error text. Does not touch the shared state.
    pub async fn check_once(&self) -> ConnectionCheck {
        let timeout = self.config.request_timeout;
        let result = tokio::time::timeout(timeout, self.backend.verify_connection()).await;
        let now = Utc::now();

        match result {
            Ok(Ok(response)) => ConnectionCheck {
                connected: response.connected,
                verified: response.verified,
                error: response.error,
                timestamp: now,
            },
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Connection verification failed");
                ConnectionCheck::failed(e.to_string(), now)
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis(),
                    "Connection verification timed out"
                );
                ConnectionCheck::failed(
                    format!("verification timed out after {}ms", timeout.as_millis()),
                    now,
                )
            }
        }
    }

    /// One loop iteration: probe, then record and publish the outcome.
    ///
    /// Returns `None` without recording or publishing when `cancel` fired
    /// while the request was in flight.
    async fn poll(&self, cancel: &CancellationToken) -> Option<ConnectionSnapshot> {
        let started = Instant::now();
        let outcome = self.probe_heartbeat().await;
        metrics::record_heartbeat_poll(&outcome, started.elapsed());
        if cancel.is_cancelled() {
            return None;
        }

        let max_failures = self.config.max_consecutive_failures;
        let (snapshot, event) = if outcome.is_success() {
            let now = Utc::now();
            let snapshot = self.state.record_success(now);
            tracing::debug!("Heartbeat ok");
            (snapshot, StatusEvent::connected(now))
        } else {
            let snapshot = self.state.record_failure();
            log_failure(&outcome, snapshot.consecutive_failures, max_failures);
            (
                snapshot,
                StatusEvent::disconnected(snapshot.consecutive_failures, max_failures),
            )
        };

        metrics::set_consecutive_failures(snapshot.consecutive_failures);
        metrics::set_backend_connected(outcome.is_success());
        self.publisher.publish(event);
        Some(snapshot)
    }
}

fn log_failure(outcome: &ProbeOutcome, consecutive_failures: u32, max_failures: u32) {
    match outcome {
        ProbeOutcome::ReportedDisconnected { error } => tracing::warn!(
            consecutive_failures,
            max_failures,
            backend_error = error.as_deref().unwrap_or(""),
            "Heartbeat reported connected=false"
        ),
        ProbeOutcome::TransportFailed { error } => tracing::warn!(
            consecutive_failures,
            max_failures,
            error = %error,
            "Heartbeat request failed"
        ),
        ProbeOutcome::TimedOut { after } => tracing::warn!(
            consecutive_failures,
            max_failures,
            timeout_ms = after.as_millis(),
            "Heartbeat request timed out"
        ),
        ProbeOutcome::Connected => {}
    }
}
