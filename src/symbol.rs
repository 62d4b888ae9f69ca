// =============================================================================
// Symbol Parser — `Exchange:FROM/TO` full-symbol strings
// =============================================================================

use crate::error::BridgeError;
use crate::types::ParsedSymbol;

/// Parse a full symbol string such as `Bitfinex:BTC/USD`.
///
/// Each of the three components must be non-empty and consist only of ASCII
/// alphanumerics or `_`.
pub fn parse_full_symbol(full_symbol: &str) -> Result<ParsedSymbol, BridgeError> {
    let fail = || BridgeError::SymbolParse {
        symbol: full_symbol.to_string(),
    };

    let (exchange, pair) = full_symbol.split_once(':').ok_or_else(fail)?;
    let (from_symbol, to_symbol) = pair.split_once('/').ok_or_else(fail)?;

    if ![exchange, from_symbol, to_symbol].iter().all(|part| is_word(part)) {
        return Err(fail());
    }

    Ok(ParsedSymbol {
        exchange: exchange.to_string(),
        from_symbol: from_symbol.to_string(),
        to_symbol: to_symbol.to_string(),
    })
}

fn is_word(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exchange_and_pair() {
        let parsed = parse_full_symbol("Bitfinex:BTC/USD").unwrap();
        assert_eq!(parsed.exchange, "Bitfinex");
        assert_eq!(parsed.from_symbol, "BTC");
        assert_eq!(parsed.to_symbol, "USD");
    }

    #[test]
    fn rejects_missing_exchange_separator() {
        assert!(matches!(
            parse_full_symbol("BTC/USD"),
            Err(BridgeError::SymbolParse { .. })
        ));
    }

    #[test]
    fn rejects_missing_quote() {
        assert!(parse_full_symbol("Bitfinex:BTC").is_err());
        assert!(parse_full_symbol("Bitfinex:BTC/").is_err());
    }

    #[test]
    fn rejects_extra_separators() {
        assert!(parse_full_symbol("Bitfinex:BTC/USD/EUR").is_err());
        assert!(parse_full_symbol("A:B:C/D").is_err());
    }

    #[test]
    fn accepts_underscores_and_digits() {
        let parsed = parse_full_symbol("Coinbase_Pro:1INCH/USD").unwrap();
        assert_eq!(parsed.exchange, "Coinbase_Pro");
        assert_eq!(parsed.from_symbol, "1INCH");
    }
}
