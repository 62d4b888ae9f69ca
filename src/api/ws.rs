// =============================================================================
// WebSocket Handler — bar push to charting clients
// =============================================================================
//
// Clients connect to `/api/v1/ws` and drive subscriptions with text frames:
//   { "action": "subscribe", "symbol": "Bitfinex:BTC/USD", "resolution": "1",
//     "last_bar": { "time": 1000, "open": 100, "high": 100, "low": 100, "close": 100 } }
//   { "action": "unsubscribe", "subscriber_uid": "<uid>" }
//
// The server answers with `subscribed` / `unsubscribed` / `error` events and
// pushes `bar` events for every update. Subscriber ids are generated here so
// they stay unique across sockets. When the socket closes, every subscription
// it owns is removed.
//
// Bar events go through a bounded per-socket queue. When a client stops
// reading and the queue is full, further bars for it are dropped and the
// failure is logged by the delivery layer.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::streaming::BarListener;
use crate::types::{Bar, SubscriberId, SymbolInfo};

/// Pending bar events per chart socket.
const CLIENT_QUEUE_CAPACITY: usize = 256;

// =============================================================================
// Client / server frames
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientRequest {
    Subscribe {
        symbol: String,
        resolution: String,
        #[serde(default)]
        last_bar: Option<Bar>,
    },
    Unsubscribe {
        subscriber_uid: SubscriberId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum ServerEvent {
    Subscribed {
        subscriber_uid: SubscriberId,
        symbol: String,
        resolution: String,
    },
    Unsubscribed {
        subscriber_uid: SubscriberId,
    },
    Bar {
        subscriber_uid: SubscriberId,
        bar: Bar,
    },
    Error {
        message: String,
    },
}

/// Forwards bar updates of one subscription into its socket's outbound queue.
struct SocketListener {
    subscriber_uid: SubscriberId,
    tx: mpsc::Sender<ServerEvent>,
}

impl BarListener for SocketListener {
    fn on_bar(&self, bar: &Bar) -> anyhow::Result<()> {
        self.tx
            .try_send(ServerEvent::Bar {
                subscriber_uid: self.subscriber_uid.clone(),
                bar: bar.clone(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => anyhow::anyhow!("client queue full, bar dropped"),
                TrySendError::Closed(_) => anyhow::anyhow!("client socket closed"),
            })
    }
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("chart WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Runs until the client goes away, multiplexing queued bar events and
/// inbound client frames with `tokio::select!`. Replies to client requests
/// bypass the queue.
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(CLIENT_QUEUE_CAPACITY);
    let mut owned: Vec<SubscriberId> = Vec::new();

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                if let Err(e) = send_event(&mut sender, &event).await {
                    debug!(error = %e, "chart WebSocket send failed, disconnecting");
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_client_text(&state, &text, &tx, &mut owned);
                        if let Err(e) = send_event(&mut sender, &reply).await {
                            debug!(error = %e, "chart WebSocket send failed, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("chart WebSocket Close frame received, disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "chart WebSocket receive error, disconnecting");
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    cleanup(&state, owned);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let json = serde_json::to_string(event)?;
    sender.send(Message::Text(json)).await?;
    Ok(())
}

/// Apply one client frame and produce the direct reply.
fn handle_client_text(
    state: &AppState,
    text: &str,
    tx: &mpsc::Sender<ServerEvent>,
    owned: &mut Vec<SubscriberId>,
) -> ServerEvent {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            return ServerEvent::Error {
                message: format!("invalid request: {e}"),
            }
        }
    };

    match request {
        ClientRequest::Subscribe {
            symbol,
            resolution,
            last_bar,
        } => {
            let subscriber_uid = uuid::Uuid::new_v4().to_string();
            let listener = Arc::new(SocketListener {
                subscriber_uid: subscriber_uid.clone(),
                tx: tx.clone(),
            });

            match state.streaming.subscribe_on_stream(
                &SymbolInfo::new(symbol.clone()),
                &resolution,
                listener,
                subscriber_uid.clone(),
                None,
                last_bar,
            ) {
                Ok(_) => {
                    owned.push(subscriber_uid.clone());
                    ServerEvent::Subscribed {
                        subscriber_uid,
                        symbol,
                        resolution,
                    }
                }
                Err(e) => ServerEvent::Error {
                    message: e.to_string(),
                },
            }
        }
        ClientRequest::Unsubscribe { subscriber_uid } => {
            let Some(index) = owned.iter().position(|id| *id == subscriber_uid) else {
                return ServerEvent::Error {
                    message: format!("unknown subscriber_uid: {subscriber_uid}"),
                };
            };
            owned.swap_remove(index);
            state.streaming.unsubscribe_from_stream(&subscriber_uid);
            ServerEvent::Unsubscribed { subscriber_uid }
        }
    }
}

fn cleanup(state: &AppState, owned: Vec<SubscriberId>) {
    let count = owned.len();
    for subscriber_uid in owned {
        state.streaming.unsubscribe_from_stream(&subscriber_uid);
    }
    info!(subscriptions = count, "chart WebSocket closed, cleanup complete");
}

// =============================================================================
// Tests
// =============================================================================
