//! Application Services
//!
//! - `ConnectivityMonitor`: heartbeat polling loop and one-off checks
//! - `ConnectionSupervisor`: connect/disconnect and monitor task ownership

mod monitor;
mod supervisor;

pub use monitor::{ConnectivityMonitor, LoopExit, MonitorConfig};
pub use supervisor::{ConnectionSupervisor, SupervisorError};
