//! Server-sent `connection_status` events.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use super::HttpServerState;
use crate::domain::connection::{CONNECTION_STATUS_EVENT, StatusEvent};
use crate::infrastructure::metrics;

/// Keeps the SSE client gauge in step with open streams.
struct SseClientGuard;

impl SseClientGuard {
    fn open() -> Self {
        metrics::sse_client_opened();
        tracing::debug!("SSE client connected");
        Self
    }
}

impl Drop for SseClientGuard {
    fn drop(&mut self) {
        metrics::sse_client_closed();
        tracing::debug!("SSE client disconnected");
    }
}

pub(super) async fn events_handler(
    State(state): State<Arc<HttpServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let guard = SseClientGuard::open();
    let stream = BroadcastStream::new(state.broadcast_hub.status_rx()).filter_map(move |item| {
        let _guard = &guard;
        match item {
            Ok(event) => to_sse_event(&event).map(Ok),
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "SSE client lagged, dropped status events");
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn to_sse_event(event: &StatusEvent) -> Option<Event> {
    match Event::default().event(CONNECTION_STATUS_EVENT).json_data(event) {
        Ok(sse_event) => Some(sse_event),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode status event");
            None
        }
    }
}
