//! Backend Probe Port (Driven Port)
//!
//! Interface for reaching the IBKR connector backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Backend request error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// The request could not be sent or no response arrived.
    #[error("backend request failed: {message}")]
    Transport {
        /// Transport error text.
        message: String,
    },

    /// The backend answered with a non-success HTTP status.
    #[error("backend returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// The response body did not match the expected shape.
    #[error("malformed backend response: {message}")]
    Decode {
        /// Decoder error text.
        message: String,
    },
}

/// Body of `GET /heartbeat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// `alive` or `error`.
    pub status: String,
    /// Whether the backend holds an active IBKR session.
    pub connected_to_ibkr: bool,
    /// Backend-local ISO-8601 time, without offset.
    pub timestamp: String,
    /// Error text when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HeartbeatResponse {
    /// Whether the backend reported itself alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.status == "alive"
    }
}

/// Body of `GET /verify_connection`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    /// Whether the IBKR session is connected.
    pub connected: bool,
    /// Whether the backend completed the verification.
    pub verified: bool,
    /// Backend-local ISO-8601 time, without offset.
    pub timestamp: String,
    /// Error text when verification failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Port for querying the connector backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendProbe: Send + Sync {
    /// Fetch the backend heartbeat.
    async fn heartbeat(&self) -> Result<HeartbeatResponse, BackendError>;

    /// Ask the backend to verify its IBKR connection.
    async fn verify_connection(&self) -> Result<VerifyResponse, BackendError>;
}
