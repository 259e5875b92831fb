//! Configuration Module
//!
//! Configuration loading for the gateway service.

mod settings;

pub use settings::{
    BackendSettings, BroadcastSettings, ConfigError, DEFAULT_BACKEND_URL, GatewayConfig,
    HeartbeatSettings, ServerSettings,
};
