//! Broadcast Channel Adapter
//!
//! Fans `connection_status` events out to every subscribed client using a
//! tokio broadcast channel. Each subscriber sees events in publish order; a
//! subscriber that falls more than the channel capacity behind skips the
//! oldest events.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::BroadcastSettings;
use crate::application::ports::StatusPublisher;
use crate::domain::connection::StatusEvent;
use crate::infrastructure::metrics;

// =============================================================================
// Broadcast Hub
// =============================================================================

/// Configuration for broadcast channel capacities.
#[derive(Debug, Clone, Copy)]
pub struct BroadcastConfig {
    /// Capacity of the status event channel.
    pub status_events_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            status_events_capacity: 256,
        }
    }
}

impl From<BroadcastSettings> for BroadcastConfig {
    fn from(settings: BroadcastSettings) -> Self {
        Self {
            status_events_capacity: settings.status_events_capacity,
        }
    }
}

/// Central hub for status event distribution.
///
/// # Example
///
/// ```rust
/// use connector_gateway::infrastructure::broadcast::{BroadcastConfig, BroadcastHub};
/// use connector_gateway::domain::connection::StatusEvent;
///
/// let hub = BroadcastHub::new(BroadcastConfig::default());
/// let mut rx = hub.status_rx();
///
/// let _ = hub.send_status(StatusEvent::disconnected(1, 3));
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Debug)]
pub struct BroadcastHub {
    status_tx: broadcast::Sender<StatusEvent>,
}

impl BroadcastHub {
    /// Create a new broadcast hub with the given configuration.
    #[must_use]
    pub fn new(config: BroadcastConfig) -> Self {
        Self {
            status_tx: broadcast::channel(config.status_events_capacity.max(1)).0,
        }
    }

    /// Create a new broadcast hub with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(BroadcastConfig::default())
    }

    /// Send a status event to all subscribers.
    ///
    /// Returns the number of receivers that received the event, or `None`
    /// if there are no active receivers.
    #[must_use]
    pub fn send_status(&self, event: StatusEvent) -> Option<usize> {
        self.status_tx.send(event).ok()
    }

    /// Get a new receiver for status events.
    #[must_use]
    pub fn status_rx(&self) -> broadcast::Receiver<StatusEvent> {
        self.status_tx.subscribe()
    }

    /// Get the number of active status receivers.
    #[must_use]
    pub fn status_receiver_count(&self) -> usize {
        self.status_tx.receiver_count()
    }

    /// Get statistics about the hub.
    #[must_use]
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            status_receivers: self.status_receiver_count(),
        }
    }
}

impl StatusPublisher for BroadcastHub {
    fn publish(&self, event: StatusEvent) -> usize {
        let success = event.success;
        let delivered = self.send_status(event).unwrap_or(0);
        metrics::record_status_event_published(success);
        tracing::trace!(delivered, success, "Status event published");
        delivered
    }
}

/// Shared broadcast hub reference.
pub type SharedBroadcastHub = Arc<BroadcastHub>;

/// Statistics about broadcast channels.
#[derive(Debug, Clone, Copy, Default)]
pub struct BroadcastStats {
    /// Number of status event receivers.
    pub status_receivers: usize,
}

// =============================================================================
// Tests
// =============================================================================
