//! Connection Supervisor
//!
//! Owns the connection lifecycle: explicit connects, disconnects, and the
//! single monitor task polling the backend. At most one monitor loop runs at
//! a time; starting another while one is alive is a no-op.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use super::monitor::{ConnectivityMonitor, LoopExit};
use crate::domain::connection::{ConnectionSnapshot, ProbeOutcome, SharedConnectionState};
use crate::infrastructure::metrics;

/// Errors returned by [`ConnectionSupervisor::connect`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SupervisorError {
    /// Another connect attempt holds the reconnect guard.
    #[error("a reconnection attempt is already in progress")]
    ReconnectInProgress,

    /// The backend answered but has no IBKR session.
    #[error("backend is not connected to IBKR: {reason}")]
    BackendNotConnected {
        /// Backend-supplied reason, or a generic one.
        reason: String,
    },

    /// The backend could not be reached.
    #[error("backend unreachable: {reason}")]
    BackendUnreachable {
        /// Transport or timeout description.
        reason: String,
    },
}

/// The running monitor task.
struct ActiveMonitor {
    run_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ActiveMonitor {
    /// The task cancels its own token once its loop returns, so a cancelled
    /// token covers both a disconnect and a loop that exited on its own.
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

/// Slot holding the current monitor, shared with the monitor task.
type MonitorSlot = Arc<Mutex<Option<ActiveMonitor>>>;

/// Releases the reconnect guard when dropped.
struct ReconnectGuard<'a> {
    state: &'a SharedConnectionState,
}

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.state.end_reconnect();
    }
}

/// Owner of connect/disconnect and the monitor task.
pub struct ConnectionSupervisor {
    monitor: Arc<ConnectivityMonitor>,
    state: SharedConnectionState,
    shutdown: CancellationToken,
    active: MonitorSlot,
}

impl ConnectionSupervisor {
    /// Create a supervisor. Monitor tasks are cancelled with `shutdown`.
    #[must_use]
    pub fn new(
        monitor: Arc<ConnectivityMonitor>,
        state: SharedConnectionState,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            monitor,
            state,
            shutdown,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.state.snapshot()
    }

    /// The monitor driven by this supervisor.
    #[must_use]
    pub fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    /// Whether a monitor loop is currently running.
    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.active
            .lock()
            .as_ref()
            .is_some_and(ActiveMonitor::is_running)
    }

    /// Probe the backend and, if it reports an IBKR session, mark the
    /// connection live and start monitoring.
    ///
    /// A stopped or stopping monitor from an earlier connection is awaited
    /// before the state is touched, so it cannot write over the new one.
    ///
    /// # Errors
    ///
    /// Returns `SupervisorError::ReconnectInProgress` while another attempt
    /// is running, or the reason the backend is not usable.
    pub async fn connect(&self) -> Result<ConnectionSnapshot, SupervisorError> {
        if !self.state.begin_reconnect() {
            tracing::debug!("Connect requested while another attempt is running");
            return Err(SupervisorError::ReconnectInProgress);
        }
        let _guard = ReconnectGuard { state: &self.state };

        tracing::info!("Connecting to backend");
        match self.monitor.probe_heartbeat().await {
            ProbeOutcome::Connected => {
                self.retire_stopped_monitor().await;
                {
                    // Held across both steps so a give-up racing this connect
                    // sees the new run id and leaves the state alone.
                    let mut active = self.active.lock();
                    self.state.mark_connected(Utc::now());
                    self.start_monitor_locked(&mut active);
                }
                metrics::set_backend_connected(true);
                metrics::set_consecutive_failures(0);
                tracing::info!("Backend connected");
                Ok(self.state.snapshot())
            }
            ProbeOutcome::ReportedDisconnected { error } => {
                let reason = error.unwrap_or_else(|| "no active IBKR session".to_string());
                tracing::warn!(reason = %reason, "Backend reachable but not connected to IBKR");
                Err(SupervisorError::BackendNotConnected { reason })
            }
            ProbeOutcome::TransportFailed { error } => {
                tracing::warn!(error = %error, "Backend unreachable");
                Err(SupervisorError::BackendUnreachable { reason: error })
            }
            ProbeOutcome::TimedOut { after } => {
                tracing::warn!(timeout_ms = after.as_millis(), "Backend connect timed out");
                Err(SupervisorError::BackendUnreachable {
                    reason: format!("timed out after {}ms", after.as_millis()),
                })
            }
        }
    }

    /// Start the monitor loop unless one is already running.
    ///
    /// An entry whose loop was cancelled or has exited is replaced. The new
    /// loop waits one poll interval before its first heartbeat.
    ///
    /// Returns `true` if a new task was spawned.
    pub fn start_monitor(&self) -> bool {
        let mut active = self.active.lock();
        self.start_monitor_locked(&mut active)
    }

    fn start_monitor_locked(&self, active: &mut Option<ActiveMonitor>) -> bool {
        if let Some(current) = active.as_ref()
            && current.is_running()
        {
            tracing::debug!(run_id = %current.run_id, "Monitor already running");
            return false;
        }
        if let Some(previous) = active.take() {
            previous.cancel.cancel();
        }

        let run_id = Uuid::new_v4();
        let cancel = self.shutdown.child_token();
        let monitor = Arc::clone(&self.monitor);
        let state = Arc::clone(&self.state);
        let slot = Arc::clone(&self.active);
        let token = cancel.clone();

        let handle = tokio::spawn(
            async move {
                let exit = monitor.run_after_interval(token.clone()).await;
                token.cancel();
                if let LoopExit::GaveUp { .. } = exit {
                    give_up(&slot, &state, run_id);
                }
                metrics::record_monitor_exit(exit.as_str());
                tracing::info!(exit = exit.as_str(), "Connectivity monitor stopped");
            }
            .instrument(tracing::info_span!("connectivity_monitor", %run_id)),
        );

        *active = Some(ActiveMonitor {
            run_id,
            cancel,
            handle,
        });
        true
    }

    /// Mark the connection down and stop the running monitor, if any.
    ///
    /// The stopped task stays in its slot until the next `connect` awaits it.
    /// Returns `true` if a running monitor was stopped.
    pub fn disconnect(&self) -> bool {
        self.state.mark_disconnected();
        metrics::set_backend_connected(false);

        let active = self.active.lock();
        let Some(current) = active.as_ref() else {
            return false;
        };
        let was_running = current.is_running();
        current.cancel.cancel();
        tracing::info!(run_id = %current.run_id, "Disconnected, monitor stopping");
        was_running
    }

    /// Take a cancelled or exited monitor out of the slot and wait for its
    /// task to finish. A running monitor is left alone.
    async fn retire_stopped_monitor(&self) {
        let stopped = {
            let mut active = self.active.lock();
            if active.as_ref().is_some_and(ActiveMonitor::is_running) {
                return;
            }
            active.take()
        };
        let Some(previous) = stopped else {
            return;
        };

        previous.cancel.cancel();
        if let Err(e) = previous.handle.await {
            tracing::warn!(run_id = %previous.run_id, error = %e, "Previous monitor task failed");
        }
    }
}

/// Mark the connection disconnected after a give-up, unless `run_id` has
/// already been superseded by a newer monitor.
fn give_up(slot: &MonitorSlot, state: &SharedConnectionState, run_id: Uuid) {
    let active = slot.lock();
    if active.as_ref().is_some_and(|current| current.run_id == run_id) {
        state.mark_disconnected();
        metrics::set_backend_connected(false);
    } else {
        tracing::debug!("Monitor was superseded, leaving connection state untouched");
    }
}
