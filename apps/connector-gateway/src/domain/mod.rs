//! Domain Layer - Connection state and status events.
//!
//! Pure types with no I/O. Everything here is safe to share across tasks.

/// Connection state, probe outcomes and status event payloads.
pub mod connection;
