//! WebSocket handler for real-time leak streaming
//!
//! Nothing is sent until the client asks for it:
//!
//! ```text
//! client: {"type":"subscribe"}    → server: {"type":"snapshot", ...}
//!                                   server: {"type":"update", ...} / {"type":"alert", ...} ...
//! client: {"type":"unsubscribe"}  → delivery stops, the connection stays open
//! ```
//!
//! A subscriber that falls behind the broadcast channel is resynchronised with a fresh
//! snapshot instead of being sent a partial history.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{
    SinkExt,
    stream::{SplitSink, StreamExt},
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{
    actors::messages::HubEvent,
    api::{state::ApiState, types::ClientMessage},
};

/// WebSocket upgrade handler
///
/// GET /api/v1/leak/stream
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: ApiState) {
    info!("WebSocket client connected");

    let (mut sender, mut receiver) = socket.split();
    let mut events: Option<broadcast::Receiver<HubEvent>> = None;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe) if events.is_none() => {
                            match subscribe(&state, &mut sender).await {
                                Some(rx) => events = Some(rx),
                                None => break,
                            }
                        }
                        Ok(ClientMessage::Subscribe) => debug!("client already subscribed"),
                        Ok(ClientMessage::Unsubscribe) => {
                            debug!("client unsubscribed");
                            events = None;
                        }
                        Err(e) => debug!("ignoring client message: {e}"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("WebSocket receive failed: {e}");
                    break;
                }
            },

            event = next_event(&mut events) => match event {
                Ok(event) => {
                    if !send_event(&mut sender, &event).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("subscriber lagged by {skipped} events, resynchronising");
                    match subscribe(&state, &mut sender).await {
                        Some(rx) => events = Some(rx),
                        None => break,
                    }
                }
                Err(RecvError::Closed) => {
                    debug!("broadcast channel closed");
                    break;
                }
            },
        }
    }

    info!("WebSocket client disconnected");
}

/// Subscribe to the store and send the initial snapshot
///
/// Returns `None` if the connection should be closed.
async fn subscribe(
    state: &ApiState,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Option<broadcast::Receiver<HubEvent>> {
    let subscription = match state.store.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!("failed to subscribe to store: {e:#}");
            return None;
        }
    };

    if !send_event(sender, &HubEvent::Snapshot(subscription.snapshot)).await {
        return None;
    }

    Some(subscription.events)
}

async fn next_event(
    events: &mut Option<broadcast::Receiver<HubEvent>>,
) -> Result<HubEvent, RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn send_event(sender: &mut SplitSink<WebSocket, Message>, event: &HubEvent) -> bool {
    let text = match serde_json::to_string(event) {
        Ok(text) => text,
        Err(e) => {
            error!("failed to serialize event: {e}");
            return true;
        }
    };

    if sender.send(Message::Text(text)).await.is_err() {
        debug!("WebSocket send failed, client disconnected");
        return false;
    }

    true
}
