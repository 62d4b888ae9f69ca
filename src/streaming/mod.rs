// =============================================================================
// Streaming Service — subscription multiplexer over the upstream trade feed
// =============================================================================
//
// Entry points used by the charting layer:
//   - subscribe_on_stream      register a handler for (symbol, resolution)
//   - unsubscribe_from_stream  drop a handler by subscriber id
//
// Inbound pipeline per frame: Received -> Parsed -> Classified -> Routed | Dropped.
//
// The registry mutex serialises subscribe / unsubscribe / dispatch. Control
// frames are sent while the lock is held so that SubAdd/SubRemove reach the
// writer in the same order as the registry changes that caused them. Bar
// updates are committed under the lock; listeners run after it is released.
// =============================================================================

pub mod aggregator;
pub mod listener;
pub mod registry;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;
use crate::feed::{
    decode_inbound, ChannelId, ControlMessage, ControlSink, FeedEvents, InboundMessage,
};
use crate::symbol::parse_full_symbol;
use crate::types::{Bar, SubscriberId, SymbolInfo, Trade};

pub use listener::{BarListener, Handler};
pub use registry::{Membership, Release, SubscriptionRegistry};

/// Accepted for compatibility with the charting datafeed interface; never called.
pub type ResetCacheCallback = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    Acknowledgement,
    Unrecognized,
    NoMatchingSubscription,
    /// Entries exist on the channel but none has a bar to extend yet.
    NoInitialBar,
}

/// Terminal state of one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Routed { entries: usize, delivered: usize },
    Dropped(DropReason),
}

pub struct StreamingService {
    registry: Mutex<SubscriptionRegistry>,
    sink: Arc<dyn ControlSink>,
}

impl StreamingService {
    pub fn new(sink: Arc<dyn ControlSink>) -> Self {
        Self {
            registry: Mutex::new(SubscriptionRegistry::new()),
            sink,
        }
    }

    // -------------------------------------------------------------------------
    // Subscribe / unsubscribe
    // -------------------------------------------------------------------------

    /// Register `on_realtime` for bar updates of `symbol_info` at `resolution`.
    ///
    /// Only a malformed symbol is reported as an error. A failed wire-level
    /// subscribe is logged; the local subscription is kept either way.
    pub fn subscribe_on_stream(
        &self,
        symbol_info: &SymbolInfo,
        resolution: &str,
        on_realtime: Arc<dyn BarListener>,
        subscriber_uid: impl Into<SubscriberId>,
        _on_reset_cache_needed: Option<ResetCacheCallback>,
        last_bar: Option<Bar>,
    ) -> Result<Membership, BridgeError> {
        let parsed = parse_full_symbol(&symbol_info.full_name).map_err(|e| {
            error!(error = %e, "subscribe rejected");
            e
        })?;

        let channel = ChannelId::for_symbol(&parsed);
        let handler = Handler {
            id: subscriber_uid.into(),
            listener: on_realtime,
        };
        let subscriber = handler.id.clone();

        let mut registry = self.registry.lock();
        let membership = registry.subscribe(channel.clone(), resolution.to_string(), handler, last_bar);

        match &membership {
            Membership::Joined => {
                info!(subscriber = %subscriber, channel = %channel, resolution, "handler added to existing subscription");
            }
            Membership::Created => {
                info!(subscriber = %subscriber, channel = %channel, resolution, "subscription created, channel already streaming");
            }
            Membership::Acquired(acquired) => {
                info!(subscriber = %subscriber, channel = %channel, resolution, "subscription created, subscribing upstream");
                self.send_control(ControlMessage::subscribe(acquired.clone()));
            }
        }

        Ok(membership)
    }

    /// Remove the handler registered under `subscriber_uid`.
    pub fn unsubscribe_from_stream(&self, subscriber_uid: &str) -> Release {
        let mut registry = self.registry.lock();
        let release = registry.unsubscribe(subscriber_uid);

        match &release {
            Release::NotFound => {
                warn!(subscriber = %subscriber_uid, "unsubscribe for unknown subscriber");
            }
            Release::HandlerRemoved(key) => {
                debug!(subscriber = %subscriber_uid, key = %key, "handler removed");
            }
            Release::EntryRemoved(key) => {
                info!(subscriber = %subscriber_uid, key = %key, "subscription removed, channel still in use");
            }
            Release::Released(channel) => {
                info!(subscriber = %subscriber_uid, channel = %channel, "last subscription removed, unsubscribing upstream");
                self.send_control(ControlMessage::unsubscribe(channel.clone()));
            }
        }

        release
    }

    /// Re-send a subscribe frame for every held wire channel. Used when a
    /// feed session opens, since it starts with no upstream interest.
    fn resubscribe_all(&self, registry: &SubscriptionRegistry) -> usize {
        if registry.is_empty() {
            return 0;
        }
        let channels = registry.active_channels();
        for channel in &channels {
            self.send_control(ControlMessage::subscribe(channel.clone()));
        }
        info!(channels = channels.len(), "resubscribed active channels");
        channels.len()
    }

    fn send_control(&self, message: ControlMessage) {
        if let Err(e) = self.sink.send(&message) {
            error!(error = %e, subs = ?message.subs, "control frame not sent");
        }
    }

    // -------------------------------------------------------------------------
    // Inbound pipeline
    // -------------------------------------------------------------------------

    /// Classify one inbound frame and route trades to their subscriptions.
    pub fn handle_inbound(&self, text: &str) -> DispatchOutcome {
        match decode_inbound(text) {
            Err(e) => {
                warn!(error = %e, "dropping feed message");
                DispatchOutcome::Dropped(DropReason::Malformed)
            }
            Ok(InboundMessage::SubscriptionAck { subs }) => {
                info!(subs = ?subs, "subscription confirmed");
                DispatchOutcome::Dropped(DropReason::Acknowledgement)
            }
            Ok(InboundMessage::Unrecognized { type_code }) => {
                debug!(type_code = ?type_code, "skipping non-trade event");
                DispatchOutcome::Dropped(DropReason::Unrecognized)
            }
            Ok(InboundMessage::Trade(trade)) => {
                let channel = ChannelId::for_trade(&trade);
                self.dispatch(&channel, &trade)
            }
        }
    }

    /// Apply `trade` to every subscription on `channel`, then notify handlers.
    pub fn dispatch(&self, channel: &ChannelId, trade: &Trade) -> DispatchOutcome {
        let application = self.registry.lock().apply_trade(channel, trade);

        if application.matched == 0 {
            let err = BridgeError::NoMatchingSubscription {
                channel: channel.to_string(),
            };
            debug!(error = %err, "dropping trade");
            return DispatchOutcome::Dropped(DropReason::NoMatchingSubscription);
        }
        if application.updates.is_empty() {
            debug!(channel = %channel, "no bar to extend yet");
            return DispatchOutcome::Dropped(DropReason::NoInitialBar);
        }

        let mut delivered = 0;
        for update in &application.updates {
            debug!(
                channel = %update.channel,
                resolution = %update.resolution,
                price = trade.price,
                close = update.bar.close,
                "bar updated"
            );
            delivered += listener::deliver(&update.handlers, &update.bar);
        }

        DispatchOutcome::Routed {
            entries: application.updates.len(),
            delivered,
        }
    }

    // -------------------------------------------------------------------------
    // Introspection
    // -------------------------------------------------------------------------

    pub fn active_channels(&self) -> Vec<ChannelId> {
        self.registry.lock().active_channels()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn handler_count(&self) -> usize {
        self.registry.lock().handler_count()
    }

    #[cfg(test)]
    pub fn last_bar(&self, key: &crate::feed::SubscriptionKey) -> Option<Bar> {
        self.registry.lock().entry(key).and_then(|e| e.last_bar.clone())
    }
}

impl FeedEvents for StreamingService {
    /// Publishes the session and replays held channels under one registry
    /// lock. A concurrent subscribe is either replayed here or sends its own
    /// frame afterwards, never both.
    fn on_open(&self, activate: &dyn Fn()) {
        let registry = self.registry.lock();
        activate();
        self.resubscribe_all(&registry);
    }

    fn on_text(&self, text: &str) {
        self.handle_inbound(text);
    }
}
