// =============================================================================
// Bridge error taxonomy
// =============================================================================
//
// None of these are process-fatal. Parse and protocol errors are logged where
// they occur; `NotConnected` is reported by the caller that attempted the send.
// =============================================================================

use crate::types::SubscriberId;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("cannot parse symbol: {symbol}")]
    SymbolParse { symbol: String },

    #[error("feed not connected, cannot {action}")]
    NotConnected { action: &'static str },

    #[error("malformed trade message: {reason}")]
    MalformedTrade { reason: String },

    #[error("no subscription for channel {channel}")]
    NoMatchingSubscription { channel: String },

    #[error("callback for subscriber {subscriber} failed: {reason}")]
    Callback {
        subscriber: SubscriberId,
        reason: String,
    },

    #[error("failed to encode control message")]
    Encode(#[from] serde_json::Error),
}

impl BridgeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTrade {
            reason: reason.into(),
        }
    }
}
