//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.
//! Every setting is optional; malformed numeric values fall back to their
//! defaults, while an unusable backend URL or failure threshold is rejected.

use std::time::Duration;

/// Default connector backend address.
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:5000";

/// Connector backend settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL of the IBKR connector backend.
    pub base_url: String,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BACKEND_URL.to_string(),
        }
    }
}

/// Heartbeat monitor settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSettings {
    /// Wait between heartbeat polls.
    pub poll_interval: Duration,
    /// Upper bound on a single backend request.
    pub request_timeout: Duration,
    /// Failed polls in a row before the monitor gives up.
    pub max_consecutive_failures: u32,
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            max_consecutive_failures: 3,
        }
    }
}

/// Status event broadcast settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSettings {
    /// Capacity of the status event channel per subscriber.
    pub status_events_capacity: usize,
}

impl Default for BroadcastSettings {
    fn default() -> Self {
        Self {
            status_events_capacity: 256,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Port serving the API, event stream, health and metrics routes.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Connector backend settings.
    pub backend: BackendSettings,
    /// Heartbeat monitor settings.
    pub heartbeat: HeartbeatSettings,
    /// HTTP server settings.
    pub server: ServerSettings,
    /// Broadcast channel settings.
    pub broadcast: BroadcastSettings,
    /// Attempt a backend connect at startup.
    pub auto_connect: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            heartbeat: HeartbeatSettings::default(),
            server: ServerSettings::default(),
            broadcast: BroadcastSettings::default(),
            auto_connect: true,
        }
    }
}

impl GatewayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `IBKR_BACKEND_URL` is not a valid http(s) URL or
    /// the failure threshold is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`GatewayConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let base_url = lookup("IBKR_BACKEND_URL")
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.backend.base_url);
        validate_backend_url(&base_url)?;

        let heartbeat = HeartbeatSettings {
            poll_interval: parse_duration_secs(
                &lookup,
                "HEARTBEAT_POLL_INTERVAL_SECS",
                defaults.heartbeat.poll_interval,
            ),
            request_timeout: parse_duration_secs(
                &lookup,
                "HEARTBEAT_REQUEST_TIMEOUT_SECS",
                defaults.heartbeat.request_timeout,
            ),
            max_consecutive_failures: parse_or(
                &lookup,
                "HEARTBEAT_MAX_CONSECUTIVE_FAILURES",
                defaults.heartbeat.max_consecutive_failures,
            ),
        };

        if heartbeat.max_consecutive_failures == 0 {
            return Err(ConfigError::InvalidValue {
                key: "HEARTBEAT_MAX_CONSECUTIVE_FAILURES".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let server = ServerSettings {
            http_port: parse_or(&lookup, "GATEWAY_HTTP_PORT", defaults.server.http_port),
        };

        let broadcast = BroadcastSettings {
            status_events_capacity: parse_or(
                &lookup,
                "GATEWAY_EVENTS_CAPACITY",
                defaults.broadcast.status_events_capacity,
            )
            .max(1),
        };

        let auto_connect = lookup("GATEWAY_AUTO_CONNECT")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.auto_connect);

        Ok(Self {
            backend: BackendSettings { base_url },
            heartbeat,
            server,
            broadcast,
            auto_connect,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Backend URL could not be parsed.
    #[error("invalid backend URL {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// Parser message.
        reason: String,
    },
    /// A setting has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

fn validate_backend_url(url: &str) -> Result<(), ConfigError> {
    let parsed = reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme {other:?}"),
        }),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
