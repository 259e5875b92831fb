//! Connector Backend HTTP Client
//!
//! reqwest adapter for the IBKR connector backend's health routes.
//!
//! # Endpoints
//!
//! - `GET /heartbeat` - liveness plus IBKR session flag
//! - `GET /verify_connection` - explicit connection verification

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;

use crate::application::ports::{BackendError, BackendProbe, HeartbeatResponse, VerifyResponse};

const HEARTBEAT_PATH: &str = "heartbeat";
const VERIFY_CONNECTION_PATH: &str = "verify_connection";

/// Errors raised while constructing the client.
#[derive(Debug, thiserror::Error)]
pub enum BackendClientError {
    /// Base URL could not be parsed.
    #[error("invalid backend URL {0:?}: {1}")]
    InvalidUrl(String, String),

    /// HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

/// HTTP client for the connector backend.
#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    client: Client,
    base_url: Url,
}

impl HttpBackendClient {
    /// Create a client for `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `BackendClientError` if the URL is invalid or the TLS
    /// backend cannot be initialised.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BackendClientError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| BackendClientError::InvalidUrl(base_url.to_string(), e.to_string()))?;

        // Url::join replaces the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("connector-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendClientError::Build(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// The normalised base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, BackendError> {
        let url = self.base_url.join(path).map_err(|e| BackendError::Transport {
            message: format!("invalid request path {path:?}: {e}"),
        })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| BackendError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
            });
        }

        response.json::<T>().await.map_err(|e| BackendError::Decode {
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl BackendProbe for HttpBackendClient {
    async fn heartbeat(&self) -> Result<HeartbeatResponse, BackendError> {
        self.get_json(HEARTBEAT_PATH).await
    }

    async fn verify_connection(&self) -> Result<VerifyResponse, BackendError> {
        self.get_json(VERIFY_CONNECTION_PATH).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn client_for(server: &MockServer) -> HttpBackendClient {
        HttpBackendClient::new(&server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let client =
            HttpBackendClient::new("http://bridge:5000/api", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url().as_str(), "http://bridge:5000/api/");
        assert_eq!(
            client.base_url().join(HEARTBEAT_PATH).unwrap().as_str(),
            "http://bridge:5000/api/heartbeat"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = HttpBackendClient::new("::nope::", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BackendClientError::InvalidUrl(..)));
    }

    #[tokio::test]
    async fn heartbeat_parses_alive_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "alive",
                "timestamp": "2024-03-01T12:00:00.000001",
                "connected_to_ibkr": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = client_for(&server).heartbeat().await.unwrap();
        assert!(response.is_alive());
        assert!(response.connected_to_ibkr);
    }

    #[tokio::test]
    async fn heartbeat_error_body_is_not_a_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "error",
                "error": "'NoneType' object has no attribute 'isConnected'",
                "timestamp": "2024-03-01T12:00:00",
                "connected_to_ibkr": false,
            })))
            .mount(&server)
            .await;

        let response = client_for(&server).heartbeat().await.unwrap();
        assert!(!response.is_alive());
        assert!(!response.connected_to_ibkr);
        assert!(response.error.is_some());
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/verify_connection"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let err = client_for(&server).verify_connection().await.unwrap_err();
        assert_eq!(err, BackendError::Status { status: 502 });
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/heartbeat"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = client_for(&server).heartbeat().await.unwrap_err();
        assert!(matches!(err, BackendError::Decode { .. }));
    }

    #[tokio::test]
    async fn slow_backend_hits_client_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/heartbeat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "status": "alive",
                        "timestamp": "2024-03-01T12:00:00",
                        "connected_to_ibkr": true,
                    }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client = HttpBackendClient::new(&server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.heartbeat().await.unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        let client =
            HttpBackendClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = client.heartbeat().await.unwrap_err();
        assert!(matches!(err, BackendError::Transport { .. }));
    }
}
