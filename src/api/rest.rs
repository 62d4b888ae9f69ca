// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`:
//   - GET /api/v1/health        feed connection + subscription counters
//   - GET /api/v1/chart-config  bootstrap settings for the chart widget,
//                               including the toolbar time frames
//   - GET /api/v1/ws            bar push socket (see ws.rs)
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::app_state::AppState;
use crate::feed::ControlSink;
use crate::types::ConnectionState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/chart-config", get(chart_config))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    connection: ConnectionState,
    active_channels: usize,
    subscriptions: usize,
    handlers: usize,
    uptime_secs: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let streaming = &state.streaming;
    let resp = HealthResponse {
        status: if state.feed.is_connected() { "ok" } else { "degraded" },
        connection: state.feed.state(),
        active_channels: streaming.active_channels().len(),
        subscriptions: streaming.subscription_count(),
        handlers: streaming.handler_count(),
        uptime_secs: state.uptime_secs(),
        server_time: chrono::Utc::now().timestamp_millis(),
    };
    Json(resp)
}

// =============================================================================
// Chart bootstrap config
// =============================================================================

#[derive(Serialize)]
struct TimeFrame {
    text: &'static str,
    resolution: &'static str,
    description: &'static str,
}

/// Resolution shortcuts offered by the chart toolbar.
const TIME_FRAMES: [TimeFrame; 4] = [
    TimeFrame { text: "1m", resolution: "1", description: "1 Minute" },
    TimeFrame { text: "15m", resolution: "15", description: "15 Minutes" },
    TimeFrame { text: "1h", resolution: "240", description: "1 Hour" },
    TimeFrame { text: "1d", resolution: "1D", description: "1 Day" },
];

#[derive(Serialize)]
struct ChartConfigResponse<'a> {
    symbol: &'a str,
    interval: &'a str,
    time_frames: &'a [TimeFrame],
    client_id: &'a str,
    user_id: &'a str,
    history_base_url: &'a str,
}

async fn chart_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cfg = &state.config;
    let body = serde_json::to_value(ChartConfigResponse {
        symbol: &cfg.default_symbol,
        interval: &cfg.default_interval,
        time_frames: &TIME_FRAMES,
        client_id: &cfg.client_id,
        user_id: &cfg.user_id,
        history_base_url: &cfg.base_url,
    })
    .unwrap_or_default();
    Json(body)
}

// =============================================================================
// Tests
// =============================================================================
