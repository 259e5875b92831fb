//! Port Interfaces
//!
//! Contracts between the connectivity services and the outside world.
//!
//! ## Driven Ports (Outbound)
//!
//! - `BackendProbe`: HTTP calls to the IBKR connector backend
//! - `StatusPublisher`: fan-out of status events to browser clients

mod backend_port;
mod status_publisher_port;

pub use backend_port::{BackendError, BackendProbe, HeartbeatResponse, VerifyResponse};
pub use status_publisher_port::{NoOpStatusPublisher, StatusPublisher};

#[cfg(test)]
pub use backend_port::MockBackendProbe;
#[cfg(test)]
pub use status_publisher_port::MockStatusPublisher;
