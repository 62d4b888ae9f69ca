// =============================================================================
// Channel Key Derivation
// =============================================================================
//
// A wire channel (`0~{exchange}~{from}~{to}`) is the unit the upstream feed
// subscribes to. A subscription key pairs a wire channel with a chart
// resolution; several keys may share one wire channel.
// =============================================================================

use serde::Serialize;

use crate::types::{ParsedSymbol, Trade};

/// Sub-type prefix of the upstream trade stream.
const TRADE_SUB_TYPE: &str = "0";

/// Upstream wire channel identifier.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    pub fn new(exchange: &str, from_symbol: &str, to_symbol: &str) -> Self {
        Self(format!(
            "{TRADE_SUB_TYPE}~{exchange}~{from_symbol}~{to_symbol}"
        ))
    }

    pub fn for_symbol(symbol: &ParsedSymbol) -> Self {
        Self::new(&symbol.exchange, &symbol.from_symbol, &symbol.to_symbol)
    }

    pub fn for_trade(trade: &Trade) -> Self {
        Self::new(&trade.exchange, &trade.from_symbol, &trade.to_symbol)
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key identifying one (wire channel, resolution) subscription.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SubscriptionKey {
    pub channel: ChannelId,
    pub resolution: String,
}

impl SubscriptionKey {
    pub fn new(channel: ChannelId, resolution: impl Into<String>) -> Self {
        Self {
            channel,
            resolution: resolution.into(),
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.channel, self.resolution)
    }
}
