//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the connectivity services and the port interfaces
//! that connect them to the backend and to subscribed clients.

/// Port interfaces for external systems (backend, status fan-out).
pub mod ports;

/// Application services for connectivity monitoring and lifecycle.
pub mod services;
