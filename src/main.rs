// =============================================================================
// Tick Bridge — Main Entry Point
// =============================================================================
//
// Holds one upstream trade-feed connection, multiplexes it into per-symbol /
// per-resolution subscriptions and pushes the in-progress bar of each to the
// charting clients connected on `/api/v1/ws`.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod config;
mod error;
mod feed;
mod streaming;
mod symbol;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::BridgeConfig;
use crate::feed::FeedEvents;

const CONFIG_PATH: &str = "bridge_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Tick Bridge starting up");

    let mut config = BridgeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        BridgeConfig::default()
    });
    config.apply_env();

    if config.api_key.is_empty() {
        warn!("CRYPTOCOMPARE_API_KEY is not set; the feed will likely reject the connection");
    }
    info!(
        websocket_url = %config.websocket_url,
        default_symbol = %config.default_symbol,
        default_interval = %config.default_interval,
        "Configuration resolved"
    );

    // ── 2. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Upstream feed ─────────────────────────────────────────────────
    // A failed first connect is fatal; later disconnects are retried.
    let events: Arc<dyn FeedEvents> = state.streaming.clone();
    let reader = state
        .feed
        .connect(events.as_ref())
        .await
        .context("initial feed connection failed")?;

    let feed = state.feed.clone();
    let reconnect_delay = state.config.reconnect_delay();
    tokio::spawn(async move {
        feed.run(reader, events, reconnect_delay).await;
    });

    // ── 4. Downstream charting API ───────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&state.config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", state.config.bind_addr))?;
    info!(addr = %state.config.bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 5. Shutdown ──────────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!(
        subscriptions = state.streaming.subscription_count(),
        "Shutdown signal received, stopping"
    );

    info!("Tick Bridge shut down complete.");
    Ok(())
}
