use crate::types::{Bar, Trade};

/// Extend an in-progress bar with one trade.
///
/// `time` and `open` are carried over; `high`/`low` widen to include the trade
/// price and `close` becomes the trade price. Volume accumulates only when the
/// bar already tracks volume and the trade reports a quantity.
pub fn aggregate(previous: &Bar, trade: &Trade) -> Bar {
    let volume = match (previous.volume, trade.quantity) {
        (Some(v), Some(q)) => Some(v + q),
        (v, _) => v,
    };

    Bar {
        time: previous.time,
        open: previous.open,
        high: previous.high.max(trade.price),
        low: previous.low.min(trade.price),
        close: trade.price,
        volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(price: f64) -> Bar {
        Bar {
            time: 1000,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: None,
        }
    }

    fn trade(price: f64) -> Trade {
        Trade {
            exchange: "Bitfinex".into(),
            from_symbol: "BTC".into(),
            to_symbol: "USD".into(),
            timestamp: 1005,
            price,
            quantity: None,
        }
    }

    #[test]
    fn higher_trade_raises_high_and_close() {
        let next = aggregate(&bar(100.0), &trade(105.0));
        assert_eq!(
            next,
            Bar {
                time: 1000,
                open: 100.0,
                high: 105.0,
                low: 100.0,
                close: 105.0,
                volume: None,
            }
        );
    }

    #[test]
    fn lower_trade_lowers_low_only() {
        let next = aggregate(&bar(100.0), &trade(95.0));
        assert!((next.high - 100.0).abs() < f64::EPSILON);
        assert!((next.low - 95.0).abs() < f64::EPSILON);
        assert!((next.close - 95.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sequence_keeps_extremes_monotonic() {
        let prices = [101.0, 99.5, 104.0, 100.0, 98.0, 103.0];
        let mut current = bar(100.0);
        for &p in &prices {
            let next = aggregate(&current, &trade(p));
            assert!(next.high >= current.high);
            assert!(next.low <= current.low);
            assert!((next.close - p).abs() < f64::EPSILON);
            assert_eq!(next.time, current.time);
            assert!((next.open - current.open).abs() < f64::EPSILON);
            current = next;
        }
        assert!((current.high - 104.0).abs() < f64::EPSILON);
        assert!((current.low - 98.0).abs() < f64::EPSILON);
    }

    #[test]
    fn volume_accumulates_only_when_tracked() {
        let mut tracked = bar(100.0);
        tracked.volume = Some(2.0);
        let mut t = trade(101.0);
        t.quantity = Some(0.5);

        assert_eq!(aggregate(&tracked, &t).volume, Some(2.5));
        assert_eq!(aggregate(&bar(100.0), &t).volume, None);
        assert_eq!(aggregate(&tracked, &trade(101.0)).volume, Some(2.0));
    }
}
