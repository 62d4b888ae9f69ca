// =============================================================================
// Central Application State — Tick Bridge
// =============================================================================
//
// Ties the immutable configuration, the single upstream feed connection and
// the streaming service together. Shared across tasks as `Arc<AppState>`.
// The streaming service holds the feed only through the `ControlSink` seam.
// =============================================================================

use std::sync::Arc;
use std::time::Instant;

use crate::config::BridgeConfig;
use crate::feed::FeedConnection;
use crate::streaming::StreamingService;

pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub feed: Arc<FeedConnection>,
    pub streaming: Arc<StreamingService>,
    /// Instant when the bridge was started. Used for uptime reporting.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: BridgeConfig) -> Self {
        let feed = Arc::new(FeedConnection::new(config.stream_url()));
        let streaming = Arc::new(StreamingService::new(feed.clone()));

        Self {
            config: Arc::new(config),
            feed,
            streaming,
            start_time: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
