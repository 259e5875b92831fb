//! HTTP API Integration Tests
//!
//! Exercises the gateway router in-process with `tower::ServiceExt::oneshot`
//! against a mock connector backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use futures::StreamExt;
use serde_json::{Value, json};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use connector_gateway::{
    BroadcastConfig, BroadcastHub, ConnectionStateStore, ConnectionSupervisor,
    ConnectivityMonitor, HttpBackendClient, HttpServerState, MonitorConfig, StatusEvent,
    StatusPublisher, init_metrics, router,
};

struct Gateway {
    app: Router,
    hub: Arc<BroadcastHub>,
    supervisor: Arc<ConnectionSupervisor>,
}

fn gateway(server: &MockServer) -> Gateway {
    let config = MonitorConfig::new(Duration::from_secs(3600), Duration::from_secs(2), 3);
    let hub = Arc::new(BroadcastHub::new(BroadcastConfig::default()));
    let backend = HttpBackendClient::new(&server.uri(), config.request_timeout).unwrap();
    let state = Arc::new(ConnectionStateStore::new());
    let monitor = Arc::new(ConnectivityMonitor::new(
        config,
        Arc::clone(&state),
        Arc::new(backend),
        Arc::clone(&hub) as Arc<dyn StatusPublisher>,
    ));
    let supervisor = Arc::new(ConnectionSupervisor::new(
        monitor,
        state,
        CancellationToken::new(),
    ));
    let app = router(Arc::new(HttpServerState::new(
        "test-0.0.1".to_string(),
        Arc::clone(&supervisor),
        Arc::clone(&hub),
    )));
    Gateway {
        app,
        hub,
        supervisor,
    }
}

async fn mount_heartbeat(server: &MockServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/heartbeat"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({
                    "status": "alive",
                    "connected_to_ibkr": true,
                    "timestamp": "2024-03-01T12:00:00",
                }))
                .set_delay(delay),
        )
        .mount(server)
        .await;
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

#[tokio::test]
async fn status_starts_disconnected() {
    let server = MockServer::start().await;
    let gw = gateway(&server);

    let (status, body) = send_json(&gw.app, get("/api/connection/status")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["consecutive_failures"], 0);
    assert_eq!(body["monitoring"], false);
}

#[tokio::test]
async fn connect_then_disconnect() {
    let server = MockServer::start().await;
    mount_heartbeat(&server, Duration::ZERO).await;
    let gw = gateway(&server);

    let (status, body) = send_json(&gw.app, post("/api/connection/connect")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["message"], "Connected");

    let (status, body) = send_json(&gw.app, get("/api/connection/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["monitoring"], true);

    let (status, body) = send(&gw.app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"READY");

    let (status, body) = send_json(&gw.app, post("/api/connection/disconnect")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["monitor_stopped"], true);
    assert!(!gw.supervisor.is_monitoring());
}

#[tokio::test]
async fn connect_to_unreachable_backend_is_503() {
    // No mocks mounted: every backend route answers 404.
    let server = MockServer::start().await;
    let gw = gateway(&server);

    let (status, body) = send_json(&gw.app, post("/api/connection/connect")).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["connected"], false);
    assert_eq!(
        body["message"],
        "backend unreachable: backend returned HTTP 404"
    );
}

#[tokio::test]
async fn overlapping_connect_is_409() {
    let server = MockServer::start().await;
    mount_heartbeat(&server, Duration::from_millis(200)).await;
    let gw = gateway(&server);

    let (first, second) = tokio::join!(
        send_json(&gw.app, post("/api/connection/connect")),
        send_json(&gw.app, post("/api/connection/connect")),
    );

    let (ok, conflict) = if first.0 == StatusCode::OK {
        (first, second)
    } else {
        (second, first)
    };
    assert_eq!(ok.0, StatusCode::OK);
    assert_eq!(conflict.0, StatusCode::CONFLICT);
    assert_eq!(
        conflict.1["message"],
        "a reconnection attempt is already in progress"
    );

    gw.supervisor.disconnect();
}

#[tokio::test]
async fn verify_folds_backend_errors_into_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/verify_connection"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let (status, body) = send_json(&gw.app, get("/api/connection/verify")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], false);
    assert_eq!(body["verified"], false);
    assert_eq!(body["error"], "backend returned HTTP 500");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn verify_passes_backend_result_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/verify_connection"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "connected": true,
            "verified": true,
            "timestamp": "2024-03-01T12:00:00",
        })))
        .mount(&server)
        .await;
    let gw = gateway(&server);

    let (status, body) = send_json(&gw.app, get("/api/connection/verify")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["connected"], true);
    assert_eq!(body["verified"], true);
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn health_reports_unhealthy_while_disconnected() {
    let server = MockServer::start().await;
    let gw = gateway(&server);

    let (status, body) = send(&gw.app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"OK");

    let (status, body) = send_json(&gw.app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "unhealthy");
    assert_eq!(body["version"], "test-0.0.1");
    assert_eq!(body["connection"]["max_failures"], 3);

    let (status, _) = send(&gw.app, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn metrics_render_prometheus_text() {
    let server = MockServer::start().await;
    let gw = gateway(&server);
    let _handle = init_metrics();

    let (status, _) = send(&gw.app, get("/metrics")).await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn events_stream_status_updates() {
    let server = MockServer::start().await;
    let gw = gateway(&server);

    let response = gw.app.clone().oneshot(get("/api/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(gw.hub.status_receiver_count(), 1);

    gw.hub.publish(StatusEvent::disconnected(1, 3));

    let mut body = response.into_body().into_data_stream();
    let frame = timeout(Duration::from_secs(2), body.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.to_vec()).unwrap();

    assert!(text.contains("event: connection_status"));
    assert!(text.contains(r#""consecutive_failures":1"#));
    assert!(text.contains(r#""max_failures":3"#));
}
