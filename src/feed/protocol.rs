// =============================================================================
// Feed wire protocol — control frames out, classified events in
// =============================================================================
//
// Outbound:
//   { "action": "SubAdd",    "subs": ["0~Bitfinex~BTC~USD"] }
//   { "action": "SubRemove", "subs": ["0~Bitfinex~BTC~USD"] }
//
// Inbound frames are decoded into a closed set before any field is used:
//   - SubscriptionAck  { "action": "SubAdd", "subs": [...] }
//   - Trade            { "TYPE": "0", "M", "FSYM", "TSYM", "TS", "P", "Q"? }
//   - Unrecognized     everything else (heartbeats, errors, other TYPEs)
// =============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BridgeError;
use crate::feed::channel::ChannelId;
use crate::types::Trade;

/// `TYPE` code of a trade event.
pub const TRADE_TYPE_CODE: &str = "0";

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlAction {
    SubAdd,
    SubRemove,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubAdd => "subscribe",
            Self::SubRemove => "unsubscribe",
        }
    }
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Subscription control frame sent to the upstream feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlMessage {
    pub action: ControlAction,
    pub subs: Vec<ChannelId>,
}

impl ControlMessage {
    pub fn subscribe(channel: ChannelId) -> Self {
        Self {
            action: ControlAction::SubAdd,
            subs: vec![channel],
        }
    }

    pub fn unsubscribe(channel: ChannelId) -> Self {
        Self {
            action: ControlAction::SubRemove,
            subs: vec![channel],
        }
    }

    pub fn encode(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    SubscriptionAck { subs: Vec<String> },
    Trade(Trade),
    Unrecognized { type_code: Option<String> },
}

/// Raw envelope. Every field is optional so that classification never fails on
/// shape alone; field validation happens only once a frame is known to be a
/// trade.
#[derive(Debug, Deserialize)]
struct Envelope {
    action: Option<String>,
    subs: Option<Vec<String>>,
    #[serde(rename = "TYPE")]
    type_code: Option<Value>,
    #[serde(rename = "M")]
    exchange: Option<Value>,
    #[serde(rename = "FSYM")]
    from_symbol: Option<Value>,
    #[serde(rename = "TSYM")]
    to_symbol: Option<Value>,
    #[serde(rename = "TS")]
    timestamp: Option<Value>,
    #[serde(rename = "P")]
    price: Option<Value>,
    #[serde(rename = "Q")]
    quantity: Option<Value>,
}

/// Decode and classify one inbound text frame.
///
/// Returns `MalformedTrade` for frames that are not JSON objects, and for
/// trade frames missing a required field or carrying a non-numeric `TS`/`P`.
pub fn decode_inbound(text: &str) -> Result<InboundMessage, BridgeError> {
    let envelope: Envelope = serde_json::from_str(text)
        .map_err(|e| BridgeError::malformed(format!("invalid JSON envelope: {e}")))?;

    if envelope.action.as_deref() == Some("SubAdd") {
        if let Some(subs) = envelope.subs {
            return Ok(InboundMessage::SubscriptionAck { subs });
        }
    }

    let type_code = envelope.type_code.as_ref().and_then(normalise_type_code);
    if type_code.as_deref() != Some(TRADE_TYPE_CODE) {
        return Ok(InboundMessage::Unrecognized { type_code });
    }

    parse_trade_event(&envelope).map(InboundMessage::Trade)
}

fn parse_trade_event(envelope: &Envelope) -> Result<Trade, BridgeError> {
    let exchange = required_str(envelope.exchange.as_ref(), "M")?;
    let from_symbol = required_str(envelope.from_symbol.as_ref(), "FSYM")?;
    let to_symbol = required_str(envelope.to_symbol.as_ref(), "TSYM")?;
    let timestamp = parse_numeric(envelope.timestamp.as_ref(), "TS")?.trunc() as i64;
    let price = parse_numeric(envelope.price.as_ref(), "P")?;
    let quantity = parse_numeric(envelope.quantity.as_ref(), "Q").ok();

    Ok(Trade {
        exchange,
        from_symbol,
        to_symbol,
        timestamp,
        price,
        quantity,
    })
}

fn normalise_type_code(val: &Value) -> Option<String> {
    match val {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn required_str(val: Option<&Value>, name: &str) -> Result<String, BridgeError> {
    match val {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::String(_)) => Err(BridgeError::malformed(format!("field {name} is empty"))),
        Some(_) => Err(BridgeError::malformed(format!(
            "field {name} has unexpected JSON type"
        ))),
        None => Err(BridgeError::malformed(format!("missing field {name}"))),
    }
}

/// The feed sends numbers either as JSON numbers or as numeric strings.
fn parse_numeric(val: Option<&Value>, name: &str) -> Result<f64, BridgeError> {
    let parsed = match val {
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| BridgeError::malformed(format!("field {name} is not numeric: {s}")))?,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| BridgeError::malformed(format!("field {name} is not a valid f64")))?,
        Some(_) => {
            return Err(BridgeError::malformed(format!(
                "field {name} has unexpected JSON type"
            )))
        }
        None => return Err(BridgeError::malformed(format!("missing field {name}"))),
    };

    if !parsed.is_finite() {
        return Err(BridgeError::malformed(format!(
            "field {name} is not finite: {parsed}"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_subscribe_frame() {
        let msg = ControlMessage::subscribe(ChannelId::new("Bitfinex", "BTC", "USD"));
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"action":"SubAdd","subs":["0~Bitfinex~BTC~USD"]}"#
        );
    }

    #[test]
    fn encodes_unsubscribe_frame() {
        let msg = ControlMessage::unsubscribe(ChannelId::new("Kraken", "ETH", "EUR"));
        assert_eq!(
            msg.encode().unwrap(),
            r#"{"action":"SubRemove","subs":["0~Kraken~ETH~EUR"]}"#
        );
    }

    #[test]
    fn classifies_subscription_ack() {
        let msg = decode_inbound(r#"{"action":"SubAdd","subs":["0~Bitfinex~BTC~USD"]}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::SubscriptionAck {
                subs: vec!["0~Bitfinex~BTC~USD".to_string()]
            }
        );
    }

    #[test]
    fn classifies_trade_with_string_fields() {
        let json = r#"{"TYPE":"0","M":"Bitfinex","FSYM":"BTC","TSYM":"USD","TS":"1005","P":"105"}"#;
        match decode_inbound(json).unwrap() {
            InboundMessage::Trade(trade) => {
                assert_eq!(trade.exchange, "Bitfinex");
                assert_eq!(trade.timestamp, 1005);
                assert!((trade.price - 105.0).abs() < f64::EPSILON);
                assert_eq!(trade.quantity, None);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn classifies_trade_with_numeric_fields() {
        let json = r#"{"TYPE":"0","M":"Coinbase","FSYM":"ETH","TSYM":"USD","TS":1700000000,"P":2012.5,"Q":0.25}"#;
        match decode_inbound(json).unwrap() {
            InboundMessage::Trade(trade) => {
                assert_eq!(trade.timestamp, 1_700_000_000);
                assert!((trade.price - 2012.5).abs() < f64::EPSILON);
                assert_eq!(trade.quantity, Some(0.25));
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn non_trade_type_is_unrecognized() {
        let msg = decode_inbound(r#"{"TYPE":"999","MESSAGE":"HEARTBEAT"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Unrecognized {
                type_code: Some("999".to_string())
            }
        );

        let msg = decode_inbound(r#"{"MESSAGE":"hello"}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unrecognized { type_code: None });
    }

    #[test]
    fn missing_price_is_malformed() {
        let json = r#"{"TYPE":"0","M":"Bitfinex","FSYM":"BTC","TSYM":"USD","TS":"1005"}"#;
        assert!(matches!(
            decode_inbound(json),
            Err(BridgeError::MalformedTrade { .. })
        ));
    }

    #[test]
    fn non_numeric_timestamp_is_malformed() {
        let json = r#"{"TYPE":"0","M":"Bitfinex","FSYM":"BTC","TSYM":"USD","TS":"soon","P":"105"}"#;
        assert!(matches!(
            decode_inbound(json),
            Err(BridgeError::MalformedTrade { .. })
        ));
    }

    #[test]
    fn nan_price_is_malformed() {
        let json = r#"{"TYPE":"0","M":"Bitfinex","FSYM":"BTC","TSYM":"USD","TS":"1005","P":"NaN"}"#;
        assert!(decode_inbound(json).is_err());
    }

    #[test]
    fn empty_exchange_is_malformed() {
        let json = r#"{"TYPE":"0","M":"","FSYM":"BTC","TSYM":"USD","TS":"1005","P":"105"}"#;
        assert!(decode_inbound(json).is_err());
    }

    #[test]
    fn garbage_quantity_is_ignored() {
        let json = r#"{"TYPE":"0","M":"Bitfinex","FSYM":"BTC","TSYM":"USD","TS":"1005","P":"105","Q":"lots"}"#;
        match decode_inbound(json).unwrap() {
            InboundMessage::Trade(trade) => assert_eq!(trade.quantity, None),
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(decode_inbound("not json").is_err());
    }
}
