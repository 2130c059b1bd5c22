//! HTTP API for the coaching fan-out daemon.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::CorsLayer;

use crate::fanout::FanoutState;

pub fn create_router(state: Arc<FanoutState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/subscribe", get(subscribe))
        .route("/shutdown", post(shutdown))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: coach_core::VERSION,
    })
}

#[derive(Serialize)]
struct StatusResponse {
    version: &'static str,
    exercise: String,
    uptime_secs: u64,
    processed: u64,
    dropped: u64,
    throttled: u64,
    idle_intervals: u64,
    reconnects: u64,
    parse_errors: u64,
    subscriber_count: usize,
}

async fn status(State(state): State<Arc<FanoutState>>) -> Json<StatusResponse> {
    use std::sync::atomic::Ordering;
    Json(StatusResponse {
        version: coach_core::VERSION,
        exercise: state.exercise.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        processed: state.health.processed.load(Ordering::Relaxed),
        dropped: state.health.dropped.load(Ordering::Relaxed),
        throttled: state.health.throttled.load(Ordering::Relaxed),
        idle_intervals: state.health.idle_intervals.load(Ordering::Relaxed),
        reconnects: state.health.reconnects.load(Ordering::Relaxed),
        parse_errors: state.health.parse_errors.load(Ordering::Relaxed),
        subscriber_count: state.payload_tx.receiver_count(),
    })
}

/// Streams coaching payloads to dashboard/overlay clients as server-sent
/// events, one JSON object per processed frame. A lagged subscriber is
/// dropped (§5) rather than allowed to buffer unboundedly.
async fn subscribe(
    State(state): State<Arc<FanoutState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.payload_tx.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(json) => Some(Ok(Event::default().event("coaching").data(json.to_string()))),
        Err(_lagged) => None,
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

async fn shutdown() -> impl IntoResponse {
    tracing::info!("shutdown requested via API");
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        std::process::exit(0);
    });
    Json(serde_json::json!({ "status": "shutting_down" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let h = HealthResponse {
            status: "ok",
            version: coach_core::VERSION,
        };
        let json = serde_json::to_string(&h).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }
}
