//! WebSocket client for the hub's leak stream
//!
//! Connects to `/api/v1/leak/stream`, subscribes, and forwards every [`HubEvent`] to an
//! mpsc channel. Lost connections are retried every few seconds; each reconnect starts
//! with a fresh snapshot.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::{actors::messages::HubEvent, api::types::ClientMessage};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Streaming client for one hub
pub struct StreamClient {
    url: String,
}

impl StreamClient {
    pub fn new(api_url: &str) -> Self {
        let ws_url = crate::util::normalize_base_url(api_url)
            .replace("http://", "ws://")
            .replace("https://", "wss://");

        Self {
            url: format!("{ws_url}/api/v1/leak/stream"),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the connection task and return the event receiver
    pub fn connect(self) -> mpsc::UnboundedReceiver<HubEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                info!("connecting to {}", self.url);

                match self.connect_once(&tx).await {
                    Ok(()) if tx.is_closed() => break,
                    Ok(()) => info!("stream closed, reconnecting in {RECONNECT_DELAY:?}"),
                    Err(e) => error!("stream error: {e:#}, reconnecting in {RECONNECT_DELAY:?}"),
                }

                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        rx
    }

    async fn connect_once(&self, tx: &mpsc::UnboundedSender<HubEvent>) -> Result<()> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .with_context(|| format!("failed to connect to {}", self.url))?;

        info!("stream connected");

        let (mut write, mut read) = ws_stream.split();

        let subscribe = serde_json::to_string(&ClientMessage::Subscribe)?;
        write
            .send(Message::Text(subscribe))
            .await
            .context("failed to send subscribe")?;

        while let Some(msg) = read.next().await {
            let msg = msg.context("WebSocket message error")?;

            match msg {
                Message::Text(text) => match serde_json::from_str::<HubEvent>(&text) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            debug!("event receiver dropped");
                            break;
                        }
                    }
                    Err(e) => warn!("unreadable event: {e}"),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }

        Ok(())
    }
}
