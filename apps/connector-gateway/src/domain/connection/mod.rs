//! Connection State Tracking
//!
//! Domain types describing the gateway's view of the connector backend.
//!
//! # Design
//!
//! A single `ConnectionStateStore` owns the process-wide connection record.
//! Callers never touch the fields directly: they read a `ConnectionSnapshot`
//! copy and mutate through named transitions. Poll transitions
//! (`record_success` / `record_failure`) belong to the connectivity monitor;
//! the `connected` and `reconnect_in_progress` flags belong to the
//! connection supervisor.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

// =============================================================================
// Connection State
// =============================================================================

/// Mutable connection record guarded by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ConnectionState {
    connected: bool,
    last_heartbeat_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    reconnect_in_progress: bool,
}

/// Read-only copy of the connection record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionSnapshot {
    /// Last known reachability of the backend.
    pub connected: bool,
    /// Time of the last successful heartbeat poll.
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    /// Failed polls since the last success.
    pub consecutive_failures: u32,
    /// Whether a connect attempt is currently running.
    pub reconnect_in_progress: bool,
}

impl From<ConnectionState> for ConnectionSnapshot {
    fn from(state: ConnectionState) -> Self {
        Self {
            connected: state.connected,
            last_heartbeat_at: state.last_heartbeat_at,
            consecutive_failures: state.consecutive_failures,
            reconnect_in_progress: state.reconnect_in_progress,
        }
    }
}

/// Owner of the process-wide connection state.
#[derive(Debug, Default)]
pub struct ConnectionStateStore {
    inner: RwLock<ConnectionState>,
}

/// Shared connection state reference.
pub type SharedConnectionState = Arc<ConnectionStateStore>;

impl ConnectionStateStore {
    /// Create a store in the initial disconnected state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        (*self.inner.read()).into()
    }

    /// Whether the backend is currently considered connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.read().connected
    }

    /// Record a successful poll at `at`.
    ///
    /// Resets the failure counter and stamps the heartbeat time.
    pub fn record_success(&self, at: DateTime<Utc>) -> ConnectionSnapshot {
        let mut state = self.inner.write();
        state.consecutive_failures = 0;
        state.last_heartbeat_at = Some(at);
        (*state).into()
    }

    /// Record a failed poll. Returns the state after the increment.
    pub fn record_failure(&self) -> ConnectionSnapshot {
        let mut state = self.inner.write();
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        (*state).into()
    }

    /// Mark the backend connected after an explicit connect succeeded.
    ///
    /// A fresh connection starts with a clean failure count.
    pub fn mark_connected(&self, at: DateTime<Utc>) {
        let mut state = self.inner.write();
        state.connected = true;
        state.consecutive_failures = 0;
        state.last_heartbeat_at = Some(at);
    }

    /// Mark the backend disconnected. A running monitor loop exits at its
    /// next iteration boundary.
    pub fn mark_disconnected(&self) {
        self.inner.write().connected = false;
    }

    /// Claim the reconnect guard.
    ///
    /// Returns `false` if another connect attempt already holds it.
    #[must_use]
    pub fn begin_reconnect(&self) -> bool {
        let mut state = self.inner.write();
        if state.reconnect_in_progress {
            return false;
        }
        state.reconnect_in_progress = true;
        true
    }

    /// Release the reconnect guard.
    pub fn end_reconnect(&self) {
        self.inner.write().reconnect_in_progress = false;
    }
}

// =============================================================================
// Probe Outcomes
// =============================================================================

/// Result of a single heartbeat poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// Backend answered and reports an active IBKR session.
    Connected,
    /// Backend answered but reports `connected_to_ibkr = false`.
    ReportedDisconnected {
        /// Error text the backend attached, if any.
        error: Option<String>,
    },
    /// The request could not be completed or the body was unusable.
    TransportFailed {
        /// Error description.
        error: String,
    },
    /// The request did not finish within the request timeout.
    TimedOut {
        /// The timeout that elapsed.
        after: Duration,
    },
}

impl ProbeOutcome {
    /// Whether this outcome counts as a successful poll.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Metric label for this outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::ReportedDisconnected { .. } => "reported_disconnected",
            Self::TransportFailed { .. } => "transport_error",
            Self::TimedOut { .. } => "timeout",
        }
    }
}

// =============================================================================
// Status Events
// =============================================================================

/// Name of the push event carrying a [`StatusEvent`].
pub const CONNECTION_STATUS_EVENT: &str = "connection_status";

/// Message attached to successful polls.
pub const CONNECTED_MESSAGE: &str = "Connected";

/// Message attached to failed polls.
pub const DISCONNECTED_MESSAGE: &str = "Disconnected";

/// Payload of the `connection_status` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    /// Whether the poll succeeded.
    pub success: bool,
    /// Human readable status.
    pub message: String,
    /// Time of the successful poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Failure count after a failed poll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consecutive_failures: Option<u32>,
    /// Configured failure threshold, sent with failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_failures: Option<u32>,
}

impl StatusEvent {
    /// Event for a successful poll.
    #[must_use]
    pub fn connected(at: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: CONNECTED_MESSAGE.to_string(),
            timestamp: Some(at),
            consecutive_failures: None,
            max_failures: None,
        }
    }

    /// Event for a failed poll.
    #[must_use]
    pub fn disconnected(consecutive_failures: u32, max_failures: u32) -> Self {
        Self {
            success: false,
            message: DISCONNECTED_MESSAGE.to_string(),
            timestamp: None,
            consecutive_failures: Some(consecutive_failures),
            max_failures: Some(max_failures),
        }
    }
}

// =============================================================================
// Single Check Result
// =============================================================================

/// Result of a one-off reachability check.
///
/// Faults are carried in `error` rather than raised, so callers only read
/// fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionCheck {
    /// Whether the backend reports an active IBKR session.
    pub connected: bool,
    /// Whether the backend completed its verification.
    pub verified: bool,
    /// Failure description when the check could not complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Time the check finished.
    pub timestamp: DateTime<Utc>,
}

impl ConnectionCheck {
    /// Check that failed before the backend could answer.
    #[must_use]
    pub fn failed(error: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            connected: false,
            verified: false,
            error: Some(error.into()),
            timestamp,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn new_store_is_disconnected() {
        let store = ConnectionStateStore::new();
        let snapshot = store.snapshot();
        assert!(!snapshot.connected);
        assert_eq!(snapshot.last_heartbeat_at, None);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert!(!snapshot.reconnect_in_progress);
    }

    #[test]
    fn failure_then_success_resets_counter() {
        let store = ConnectionStateStore::new();
        assert_eq!(store.record_failure().consecutive_failures, 1);
        assert_eq!(store.record_failure().consecutive_failures, 2);

        let now = Utc::now();
        let snapshot = store.record_success(now);
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.last_heartbeat_at, Some(now));
    }

    #[test]
    fn failure_keeps_last_heartbeat() {
        let store = ConnectionStateStore::new();
        let now = Utc::now();
        store.record_success(now);

        let snapshot = store.record_failure();
        assert_eq!(snapshot.last_heartbeat_at, Some(now));
    }

    #[test]
    fn reconnect_guard_is_exclusive() {
        let store = ConnectionStateStore::new();
        assert!(store.begin_reconnect());
        assert!(!store.begin_reconnect());
        assert!(store.snapshot().reconnect_in_progress);

        store.end_reconnect();
        assert!(store.begin_reconnect());
    }

    #[test]
    fn mark_connected_clears_failures() {
        let store = ConnectionStateStore::new();
        store.record_failure();
        store.record_failure();

        store.mark_connected(Utc::now());
        let snapshot = store.snapshot();
        assert!(snapshot.connected);
        assert_eq!(snapshot.consecutive_failures, 0);

        store.mark_disconnected();
        assert!(!store.is_connected());
    }

    #[test]
    fn connected_event_serialization() {
        let at = DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let json = serde_json::to_value(StatusEvent::connected(at)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": true,
                "message": "Connected",
                "timestamp": "2024-03-01T12:00:00Z",
            })
        );
    }

    #[test]
    fn disconnected_event_serialization() {
        let json = serde_json::to_value(StatusEvent::disconnected(2, 3)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "message": "Disconnected",
                "consecutive_failures": 2,
                "max_failures": 3,
            })
        );
    }

    #[test]
    fn failed_check_is_never_connected() {
        let check = ConnectionCheck::failed("connection refused", Utc::now());
        assert!(!check.connected);
        assert!(!check.verified);
        assert_eq!(check.error.as_deref(), Some("connection refused"));
    }

    #[test]
    fn outcome_labels() {
        assert!(ProbeOutcome::Connected.is_success());
        assert!(!ProbeOutcome::ReportedDisconnected { error: None }.is_success());
        assert_eq!(
            ProbeOutcome::TimedOut {
                after: Duration::from_secs(5)
            }
            .label(),
            "timeout"
        );
    }

    proptest! {
        #[test]
        fn failures_count_since_last_success(outcomes in proptest::collection::vec(any::<bool>(), 0..64)) {
            let store = ConnectionStateStore::new();
            let mut expected = 0u32;

            for success in outcomes {
                let snapshot = if success {
                    expected = 0;
                    store.record_success(Utc::now())
                } else {
                    expected += 1;
                    store.record_failure()
                };
                prop_assert_eq!(snapshot.consecutive_failures, expected);
            }
        }
    }
}
