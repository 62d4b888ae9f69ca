// =============================================================================
// Bridge Configuration — read once at startup, immutable afterwards
// =============================================================================
//
// Resolution order (later wins):
//   1. Built-in defaults.
//   2. Optional JSON file (`bridge_config.json`).
//   3. Environment variables (including any loaded from `.env`).
//
// All fields carry `#[serde(default)]` so a partial file still loads.
//
// SECURITY: the API key is never logged; `Debug` prints it redacted.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_base_url() -> String {
    "https://min-api.cryptocompare.com".to_string()
}

fn default_websocket_url() -> String {
    "wss://streamer.cryptocompare.com/v2".to_string()
}

fn default_symbol() -> String {
    "Bitfinex:BTC/USD".to_string()
}

fn default_interval() -> String {
    "15".to_string()
}

fn default_client_id() -> String {
    "tradingview.com".to_string()
}

fn default_user_id() -> String {
    "public_user_id".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// =============================================================================
// BridgeConfig
// =============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Pre-shared key embedded in the stream URL.
    #[serde(default)]
    pub api_key: String,

    /// REST base URL of the feed provider, handed to the chart for history fetches.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Streaming endpoint, without the `api_key` query parameter.
    #[serde(default = "default_websocket_url")]
    pub websocket_url: String,

    #[serde(default = "default_symbol")]
    pub default_symbol: String,

    #[serde(default = "default_interval")]
    pub default_interval: String,

    /// Charting client identity, passed through to the chart widget.
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Listen address of the downstream charting API.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Pause between feed reconnect attempts.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            websocket_url: default_websocket_url(),
            default_symbol: default_symbol(),
            default_interval: default_interval(),
            client_id: default_client_id(),
            user_id: default_user_id(),
            bind_addr: default_bind_addr(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
        }
    }
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("websocket_url", &self.websocket_url)
            .field("default_symbol", &self.default_symbol)
            .field("default_interval", &self.default_interval)
            .field("client_id", &self.client_id)
            .field("user_id", &self.user_id)
            .field("bind_addr", &self.bind_addr)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .finish()
    }
}

impl BridgeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read bridge config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse bridge config from {}", path.display()))?;

        info!(
            path = %path.display(),
            websocket_url = %config.websocket_url,
            default_symbol = %config.default_symbol,
            "bridge config loaded"
        );

        Ok(config)
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from `lookup`; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("CRYPTOCOMPARE_API_KEY") {
            self.api_key = v;
        }
        if let Some(v) = get("CRYPTOCOMPARE_BASE_URL") {
            self.base_url = v;
        }
        if let Some(v) = get("CRYPTOCOMPARE_WEBSOCKET_URL") {
            self.websocket_url = v;
        }
        if let Some(v) = get("DEFAULT_SYMBOL") {
            self.default_symbol = v;
        }
        if let Some(v) = get("DEFAULT_INTERVAL") {
            self.default_interval = v;
        }
        if let Some(v) = get("TRADINGVIEW_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = get("TRADINGVIEW_USER_ID") {
            self.user_id = v;
        }
        if let Some(v) = get("BRIDGE_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = get("BRIDGE_RECONNECT_DELAY_SECS").and_then(|v| v.trim().parse().ok()) {
            self.reconnect_delay_secs = v;
        }
    }

    /// Authenticated stream URL: `{websocket_url}?api_key={api_key}`.
    pub fn stream_url(&self) -> String {
        format!("{}?api_key={}", self.websocket_url, self.api_key)
    }

    pub fn reconnect_delay(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reconnect_delay_secs)
    }
}
