//! Status Publisher Port (Driven Port)
//!
//! Interface for pushing connection status events to subscribers.

use crate::domain::connection::StatusEvent;

/// Port for fanning status events out to connected clients.
///
/// Publishing is fire-and-forget: having no subscribers is not an error.
#[cfg_attr(test, mockall::automock)]
pub trait StatusPublisher: Send + Sync {
    /// Publish an event to all current subscribers.
    ///
    /// Returns the number of subscribers that received it.
    fn publish(&self, event: StatusEvent) -> usize;
}

/// Publisher that drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpStatusPublisher;

impl StatusPublisher for NoOpStatusPublisher {
    fn publish(&self, _event: StatusEvent) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_publisher_reaches_nobody() {
        let publisher = NoOpStatusPublisher;
        assert_eq!(publisher.publish(StatusEvent::disconnected(1, 3)), 0);
    }
}
