// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only view of the pipeline: current score, indicator set, event log,
// and the latest snapshot. All endpoints live under `/api/v1/` and mutate
// nothing; the engine is driven solely by its cycle loop.
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::engine::SentinelState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST router with CORS middleware and shared state.
pub fn router(state: Arc<SentinelState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/score", get(score))
        .route("/api/v1/indicators", get(indicators))
        .route("/api/v1/events", get(events))
        .route("/api/v1/snapshot", get(snapshot))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    symbol: String,
    cycles_completed: u64,
    providers_reporting: usize,
    snapshots_retained: usize,
    uptime_secs: i64,
    server_time: i64,
}

async fn health(State(state): State<Arc<SentinelState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        symbol: state.config.symbol.clone(),
        cycles_completed: state.cycles_completed(),
        providers_reporting: state.board.provider_count(),
        snapshots_retained: state.ring.snapshot_count(),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
        server_time: Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Score
// =============================================================================

async fn score(State(state): State<Arc<SentinelState>>) -> impl IntoResponse {
    match state.last_score() {
        Some(score) => Json(score).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no cycle has completed yet" })),
        )
            .into_response(),
    }
}

// =============================================================================
// Indicators
// =============================================================================

async fn indicators(State(state): State<Arc<SentinelState>>) -> impl IntoResponse {
    let set = state.last_indicators();
    // Keyed by the indicator's table name for a stable JSON shape.
    let body: serde_json::Map<String, serde_json::Value> = set
        .iter()
        .filter_map(|(name, value)| {
            serde_json::to_value(value)
                .ok()
                .map(|v| (name.as_str().to_string(), v))
        })
        .collect();
    Json(serde_json::Value::Object(body))
}

// =============================================================================
// Events
// =============================================================================

#[derive(Deserialize)]
struct EventsQuery {
    /// Unix epoch milliseconds; only events at or after this instant.
    since: Option<i64>,
    limit: Option<usize>,
}

async fn events(
    State(state): State<Arc<SentinelState>>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let events = match query.since {
        Some(ms) => {
            let Some(since) = Utc.timestamp_millis_opt(ms).single() else {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({ "error": "invalid `since` timestamp" })),
                )
                    .into_response();
            };
            state.events_since(since)
        }
        None => state.recent_events(query.limit.unwrap_or(100)),
    };
    Json(events).into_response()
}

// =============================================================================
// Snapshot
// =============================================================================

async fn snapshot(State(state): State<Arc<SentinelState>>) -> impl IntoResponse {
    match state.latest_snapshot() {
        Some(snap) => Json(snap).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "no snapshot assembled yet" })),
        )
            .into_response(),
    }
}
