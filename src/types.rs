// =============================================================================
// Shared types used across the tick bridge
// =============================================================================

use serde::{Deserialize, Serialize};

/// Caller-supplied identifier of one logical subscription request.
pub type SubscriberId = String;

/// Chart resolution as sent by the charting layer (`"1"`, `"15"`, `"1D"`, ...).
pub type Resolution = String;

/// In-progress OHLC bar for one subscription key.
///
/// `time` is the bar open time in epoch seconds. `open` and `time` never change
/// while the bar is being extended by trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// A single executed trade from the upstream feed.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub exchange: String,
    pub from_symbol: String,
    pub to_symbol: String,
    /// Trade time in epoch seconds.
    pub timestamp: i64,
    pub price: f64,
    /// Traded quantity, when the feed reports one.
    pub quantity: Option<f64>,
}

/// Symbol description handed over by the charting layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolInfo {
    pub full_name: String,
}

impl SymbolInfo {
    pub fn new(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
        }
    }
}

/// Structured form of a full symbol string such as `Bitfinex:BTC/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParsedSymbol {
    pub exchange: String,
    pub from_symbol: String,
    pub to_symbol: String,
}

/// Lifecycle of the single upstream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Connecting
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}
