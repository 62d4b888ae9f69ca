// =============================================================================
// Feed Connection Manager — the single upstream WebSocket
// =============================================================================
//
// Owns the connection lifecycle (Connecting -> Connected -> Disconnected) and
// the outbound path. Control frames are handed to a per-session writer task
// through an unbounded channel, so `send` never blocks. Sends are refused while
// the state is anything other than `Connected`; nothing is queued.
//
// A new session is published as `Connected` from inside `FeedEvents::on_open`,
// which lets the subscription layer replay its channels atomically with the
// state change.
//
// SECURITY: the stream URL carries the API key as a query parameter and is
// never logged verbatim.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use crate::error::BridgeError;
use crate::feed::protocol::ControlMessage;
use crate::types::ConnectionState;

pub type FeedReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Outbound half of the feed, as seen by the subscription layer.
pub trait ControlSink: Send + Sync {
    fn is_connected(&self) -> bool;

    /// Transmit a control frame. Fails with `NotConnected` unless connected.
    fn send(&self, message: &ControlMessage) -> Result<(), BridgeError>;
}

/// Receiver of inbound feed events.
pub trait FeedEvents: Send + Sync {
    /// Called every time a session is established, before it is published.
    /// `activate` marks the session `Connected`; frames sent before that call
    /// are refused.
    fn on_open(&self, activate: &dyn Fn());

    /// Called for every inbound text frame, in arrival order.
    fn on_text(&self, text: &str);
}

pub struct FeedConnection {
    url: String,
    state: RwLock<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
}

impl FeedConnection {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: RwLock::new(ConnectionState::Connecting),
            outbound: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Open a new session and hand it to `events.on_open`. On success the
    /// state is `Connected` and the returned reader yields the inbound frames
    /// of this session.
    pub async fn connect(&self, events: &dyn FeedEvents) -> Result<FeedReader> {
        *self.state.write() = ConnectionState::Connecting;
        let endpoint = redact_url(&self.url);
        info!(url = %endpoint, "connecting to feed WebSocket");

        let (ws_stream, _response) = match connect_async(&self.url).await {
            Ok(ok) => ok,
            Err(e) => {
                *self.state.write() = ConnectionState::Disconnected;
                return Err(e).context("failed to connect to feed WebSocket");
            }
        };

        let (mut write, read) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = write.send(msg).await {
                    warn!(error = %e, "feed write failed");
                    break;
                }
            }
            debug!("feed writer finished");
        });

        *self.outbound.lock() = Some(tx);
        events.on_open(&|| self.mark_connected());
        self.mark_connected();
        info!(url = %endpoint, "feed WebSocket connected");

        Ok(read)
    }

    /// Pump one session's inbound frames into `events` until the session ends.
    ///
    /// Returns `Ok(())` on a clean close or end of stream and the transport
    /// error otherwise. Either way the state is `Disconnected` afterwards.
    pub async fn read_session(&self, read: &mut FeedReader, events: &dyn FeedEvents) -> Result<()> {
        let result = loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => events.on_text(&text),
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "feed WebSocket closed by peer");
                    break Ok(());
                }
                // tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(error = %e, "feed WebSocket read error");
                    break Err(anyhow::Error::new(e).context("feed WebSocket read error"));
                }
                None => {
                    warn!("feed WebSocket stream ended");
                    break Ok(());
                }
            }
        };

        self.mark_disconnected();
        result
    }

    /// Drive the feed forever: read the current session, then reconnect after
    /// `reconnect_delay` whenever it ends. `reader` must come from a
    /// `connect` with the same `events`.
    pub async fn run(
        self: Arc<Self>,
        mut reader: FeedReader,
        events: Arc<dyn FeedEvents>,
        reconnect_delay: Duration,
    ) {
        loop {
            if let Err(e) = self.read_session(&mut reader, events.as_ref()).await {
                error!(error = %e, "feed session error");
            }

            reader = loop {
                warn!(delay_secs = reconnect_delay.as_secs(), "feed disconnected, reconnecting");
                tokio::time::sleep(reconnect_delay).await;
                match self.connect(events.as_ref()).await {
                    Ok(next) => break next,
                    Err(e) => error!(error = %e, "feed reconnect failed"),
                }
            };
        }
    }

    fn mark_connected(&self) {
        *self.state.write() = ConnectionState::Connected;
    }

    fn mark_disconnected(&self) {
        *self.state.write() = ConnectionState::Disconnected;
        // Dropping the sender stops the writer task.
        self.outbound.lock().take();
    }
}

impl ControlSink for FeedConnection {
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn send(&self, message: &ControlMessage) -> Result<(), BridgeError> {
        let not_connected = || BridgeError::NotConnected {
            action: message.action.as_str(),
        };

        if !self.is_connected() {
            return Err(not_connected());
        }

        let text = message.encode()?;
        let outbound = self.outbound.lock();
        let tx = outbound.as_ref().ok_or_else(not_connected)?;
        tx.send(Message::Text(text)).map_err(|_| not_connected())?;

        debug!(action = %message.action, subs = ?message.subs, "control frame sent");
        Ok(())
    }
}

/// Strip the query string (and with it the API key) from a URL for logging.
fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
