use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, Sse},
    routing::get,
    Json, Router,
};
use futures::{future, stream, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::feed::{SourceHealth, SourceId, SourcePair};
use crate::merge::{merge, UnifiedSnapshot};
use crate::stream::{Envelope, EventKind, Registry, SubscriberGuard};

const CONNECTED_MESSAGE: &str = "Connected - monitoring both APIs for rate updates";

#[derive(Clone)]
pub struct AppState {
    pub sources: SourcePair,
    pub registry: Arc<Registry>,
    pub health: Arc<SourceHealth>,
    /// Idle gap after which a `ping` frame is emitted on the stream.
    pub keepalive: Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/events", get(events))
        .route("/rate", get(rate))
        .route("/rate/api1", get(rate_api1))
        .route("/rate/api2", get(rate_api2))
        .route("/health", get(health))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

impl Envelope {
    fn to_event(&self) -> Event {
        Event::default()
            .event(self.kind.as_str())
            .data(self.data.to_string())
    }
}

/// State threaded through the SSE stream: the subscriber's queue plus the
/// guard that unregisters it when the connection goes away.
struct StreamCtx {
    rx: mpsc::Receiver<Envelope>,
    _guard: SubscriberGuard,
    keepalive: Duration,
}

/// Streaming subscription channel. Emits `connected` immediately, then queued
/// events in FIFO order; an idle keep-alive timeout yields a `ping` frame so
/// intermediaries don't mistake a quiet stream for a dead one. The stream ends
/// when the sender side disappears (eviction or shutdown).
async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (id, rx) = state.registry.register();
    let guard = SubscriberGuard::new(state.registry.clone(), id);

    let hello = Envelope::new(EventKind::Connected, json!({ "message": CONNECTED_MESSAGE }));
    let first = stream::once(future::ready(Ok::<_, Infallible>(hello.to_event())));

    let ctx = StreamCtx {
        rx,
        _guard: guard,
        keepalive: state.keepalive,
    };
    let updates = stream::unfold(ctx, |mut ctx| async move {
        match tokio::time::timeout(ctx.keepalive, ctx.rx.recv()).await {
            Ok(Some(envelope)) => Some((Ok(envelope.to_event()), ctx)),
            // Sender dropped: the subscriber was evicted or the registry
            // cleared for shutdown. Close the stream.
            Ok(None) => None,
            Err(_) => Some((Ok(Envelope::ping().to_event()), ctx)),
        }
    });

    Sse::new(first.chain(updates))
}

type ApiError = (StatusCode, Json<Value>);

/// Current merged snapshot, fetched fresh and independent of the polling
/// cycle's cached state.
async fn rate(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let (raw1, raw2) = state.sources.fetch_both().await;
    if raw1.is_none() && raw2.is_none() {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "Failed to fetch rates",
                "details": "Failed to fetch data from both APIs",
            })),
        ));
    }

    let snapshot = merge(raw1, raw2);
    Ok(Json(combined_wire(&state.sources, &snapshot)))
}

fn combined_wire(sources: &SourcePair, snapshot: &UnifiedSnapshot) -> Value {
    json!({
        "timestamp": snapshot.timestamp,
        "sources": {
            "api1": sources.endpoint(SourceId::Api1),
            "api2": sources.endpoint(SourceId::Api2),
        },
        "data": snapshot.records.values().collect::<Vec<_>>(),
        "totalStocks": snapshot.total(),
        "api1Count": snapshot.count_for(SourceId::Api1),
        "api2Count": snapshot.count_for(SourceId::Api2),
        "bothCount": snapshot.overlap(),
    })
}

async fn rate_api1(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    single_source(&state, SourceId::Api1).await
}

async fn rate_api2(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    single_source(&state, SourceId::Api2).await
}

async fn single_source(state: &AppState, id: SourceId) -> Result<Json<Value>, ApiError> {
    match state.sources.fetch_one(id).await {
        Some(raw) => Ok(Json(raw)),
        None => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("Failed to fetch data from {}", id.as_str().to_uppercase()) })),
        )),
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "clients": state.registry.subscriber_count(),
        "hasApi1Data": state.health.has_data(SourceId::Api1),
        "hasApi2Data": state.health.has_data(SourceId::Api2),
        "timestamp": chrono::Utc::now(),
    }))
}
