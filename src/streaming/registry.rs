// =============================================================================
// Subscription Registry — per-resolution entries over shared wire channels
// =============================================================================
//
// One entry per (wire channel, resolution). The upstream feed must hold
// interest in a wire channel exactly while at least one entry references it;
// the registry reports when a channel is acquired or released and leaves the
// actual wire traffic to the caller.
//
// Entries are kept in a BTreeMap so that scans (unsubscribe, dispatch) run in
// a deterministic key order.
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};

use crate::feed::channel::{ChannelId, SubscriptionKey};
use crate::streaming::aggregator::aggregate;
use crate::streaming::listener::Handler;
use crate::types::{Bar, Resolution, Trade};

#[derive(Debug, Clone)]
pub struct SubscriptionEntry {
    pub channel: ChannelId,
    pub resolution: Resolution,
    /// Insertion-ordered; never empty while the entry exists.
    pub handlers: Vec<Handler>,
    /// Current in-progress bar. `None` until the charting layer supplies one.
    pub last_bar: Option<Bar>,
}

/// Result of adding a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    /// An entry for the key already existed; the handler was appended.
    Joined,
    /// A new entry was created on a wire channel another entry already holds.
    Created,
    /// A new entry was created and nothing held its wire channel before.
    Acquired(ChannelId),
}

/// Result of removing a handler by subscriber id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// No entry has a handler with that id.
    NotFound,
    /// The handler was removed; its entry still has other handlers.
    HandlerRemoved(SubscriptionKey),
    /// The entry became empty and was deleted; its wire channel is still used.
    EntryRemoved(SubscriptionKey),
    /// The entry was deleted and was the last one on its wire channel.
    Released(ChannelId),
}

/// One committed bar update, ready for delivery.
#[derive(Debug, Clone)]
pub struct BarUpdate {
    pub channel: ChannelId,
    pub resolution: Resolution,
    pub bar: Bar,
    pub handlers: Vec<Handler>,
}

/// What a trade did to the registry.
#[derive(Debug, Default)]
pub struct TradeApplication {
    /// Entries on the trade's wire channel, with or without a bar.
    pub matched: usize,
    pub updates: Vec<BarUpdate>,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<SubscriptionKey, SubscriptionEntry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(
        &mut self,
        channel: ChannelId,
        resolution: Resolution,
        handler: Handler,
        initial_bar: Option<Bar>,
    ) -> Membership {
        let key = SubscriptionKey::new(channel.clone(), resolution.clone());

        if let Some(entry) = self.entries.get_mut(&key) {
            entry.handlers.push(handler);
            return Membership::Joined;
        }

        let channel_held = self.holds_channel(&channel);
        self.entries.insert(
            key,
            SubscriptionEntry {
                channel: channel.clone(),
                resolution,
                handlers: vec![handler],
                last_bar: initial_bar,
            },
        );

        if channel_held {
            Membership::Created
        } else {
            Membership::Acquired(channel)
        }
    }

    /// Remove the first handler (in key order) whose id is `subscriber_id`.
    pub fn unsubscribe(&mut self, subscriber_id: &str) -> Release {
        let found = self.entries.iter_mut().find_map(|(key, entry)| {
            let index = entry.handlers.iter().position(|h| h.id == subscriber_id)?;
            entry.handlers.remove(index);
            Some((key.clone(), entry.handlers.is_empty()))
        });

        let Some((key, now_empty)) = found else {
            return Release::NotFound;
        };
        if !now_empty {
            return Release::HandlerRemoved(key);
        }

        self.entries.remove(&key);
        if self.holds_channel(&key.channel) {
            Release::EntryRemoved(key)
        } else {
            Release::Released(key.channel)
        }
    }

    /// Fold `trade` into the bar of every entry on `channel` and commit the
    /// results. Entries without a bar are counted but left untouched.
    pub fn apply_trade(&mut self, channel: &ChannelId, trade: &Trade) -> TradeApplication {
        let mut application = TradeApplication::default();

        for entry in self.entries.values_mut().filter(|e| &e.channel == channel) {
            application.matched += 1;
            let Some(last_bar) = entry.last_bar.as_ref() else {
                continue;
            };

            let bar = aggregate(last_bar, trade);
            entry.last_bar = Some(bar.clone());
            application.updates.push(BarUpdate {
                channel: entry.channel.clone(),
                resolution: entry.resolution.clone(),
                bar,
                handlers: entry.handlers.clone(),
            });
        }

        application
    }

    pub fn holds_channel(&self, channel: &ChannelId) -> bool {
        self.entries.values().any(|e| &e.channel == channel)
    }

    /// Distinct wire channels currently held, in order.
    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.entries
            .values()
            .map(|e| e.channel.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    #[cfg(test)]
    pub fn entry(&self, key: &SubscriptionKey) -> Option<&SubscriptionEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handler_count(&self) -> usize {
        self.entries.values().map(|e| e.handlers.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn btc() -> ChannelId {
        ChannelId::new("Bitfinex", "BTC", "USD")
    }

    fn eth() -> ChannelId {
        ChannelId::new("Bitfinex", "ETH", "USD")
    }

    fn handler(id: &str) -> Handler {
        Handler {
            id: id.to_string(),
            listener: Arc::new(|_bar: &Bar| {}),
        }
    }

    fn bar(time: i64, price: f64) -> Bar {
        Bar {
            time,
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
    fn first_subscriber_acquires_channel() {
        let mut reg = SubscriptionRegistry::new();
        let m = reg.subscribe(btc(), "1".into(), handler("A"), Some(bar(1000, 100.0)));
        assert_eq!(m, Membership::Acquired(btc()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn same_key_joins_existing_entry() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), Some(bar(1000, 100.0)));
        let m = reg.subscribe(btc(), "1".into(), handler("B"), Some(bar(2000, 200.0)));
        assert_eq!(m, Membership::Joined);
        assert_eq!(reg.len(), 1);

        let entry = reg.entry(&SubscriptionKey::new(btc(), "1")).unwrap();
        let ids: Vec<_> = entry.handlers.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        // The joining subscriber does not replace the existing bar.
        assert_eq!(entry.last_bar.as_ref().unwrap().time, 1000);
    }

    #[test]
    fn second_resolution_shares_channel() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);
        let m = reg.subscribe(btc(), "15".into(), handler("B"), None);
        assert_eq!(m, Membership::Created);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.active_channels(), vec![btc()]);
    }

    #[test]
    fn unsubscribe_last_handler_releases_channel() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);
        assert_eq!(reg.unsubscribe("A"), Release::Released(btc()));
        assert!(reg.is_empty());
    }

    #[test]
    fn unsubscribe_keeps_channel_while_other_resolution_holds_it() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);
        reg.subscribe(btc(), "15".into(), handler("B"), None);

        assert_eq!(
            reg.unsubscribe("A"),
            Release::EntryRemoved(SubscriptionKey::new(btc(), "1"))
        );
        assert!(reg.entry(&SubscriptionKey::new(btc(), "15")).is_some());
        assert_eq!(reg.unsubscribe("B"), Release::Released(btc()));
    }

    #[test]
    fn unsubscribe_one_of_two_handlers_keeps_entry() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);
        reg.subscribe(btc(), "1".into(), handler("B"), None);

        assert_eq!(
            reg.unsubscribe("A"),
            Release::HandlerRemoved(SubscriptionKey::new(btc(), "1"))
        );
        assert_eq!(reg.handler_count(), 1);
    }

    #[test]
    fn unsubscribe_unknown_id_is_not_found() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);
        assert_eq!(reg.unsubscribe("Z"), Release::NotFound);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn trade_updates_each_resolution_independently() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), Some(bar(1000, 100.0)));
        reg.subscribe(btc(), "15".into(), handler("B"), Some(bar(900, 90.0)));
        reg.subscribe(eth(), "1".into(), handler("C"), Some(bar(1000, 10.0)));

        let app = reg.apply_trade(&btc(), &trade(105.0));
        assert_eq!(app.matched, 2);
        assert_eq!(app.updates.len(), 2);
        let resolutions: Vec<_> = app.updates.iter().map(|u| u.resolution.as_str()).collect();
        assert_eq!(resolutions, vec!["1", "15"]);
        assert!(app.updates.iter().all(|u| u.channel == btc()));

        let one = reg.entry(&SubscriptionKey::new(btc(), "1")).unwrap();
        let fifteen = reg.entry(&SubscriptionKey::new(btc(), "15")).unwrap();
        let one_bar = one.last_bar.as_ref().unwrap();
        let fifteen_bar = fifteen.last_bar.as_ref().unwrap();
        assert_eq!((one_bar.time, one_bar.low, one_bar.high), (1000, 100.0, 105.0));
        assert_eq!((fifteen_bar.time, fifteen_bar.low, fifteen_bar.high), (900, 90.0, 105.0));

        // Other channels untouched.
        let eth_entry = reg.entry(&SubscriptionKey::new(eth(), "1")).unwrap();
        assert!((eth_entry.last_bar.as_ref().unwrap().close - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn entry_without_bar_is_skipped() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(btc(), "1".into(), handler("A"), None);

        let app = reg.apply_trade(&btc(), &trade(105.0));
        assert_eq!(app.matched, 1);
        assert!(app.updates.is_empty());
        assert!(reg
            .entry(&SubscriptionKey::new(btc(), "1"))
            .unwrap()
            .last_bar
            .is_none());
    }

    #[test]
    fn trade_on_unknown_channel_matches_nothing() {
        let mut reg = SubscriptionRegistry::new();
        reg.subscribe(eth(), "1".into(), handler("A"), Some(bar(1000, 10.0)));
        let app = reg.apply_trade(&btc(), &trade(105.0));
        assert_eq!(app.matched, 0);
        assert!(app.updates.is_empty());
    }
}
