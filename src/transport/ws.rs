//! WebSocket connector for the realtime conversational service.

use crate::error::{Result, VoxError};
use crate::transport::messages::{ClientMessage, ServerMessage, SetupPayload};
use crate::transport::{Connector, TransportLink};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Connects to the service over WebSocket, one socket per session.
pub struct WsConnector {
    url: String,
    api_key: Option<String>,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            url: url.into(),
            api_key,
        }
    }

    fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)
            .map_err(|e| VoxError::Transport(format!("invalid service URL: {e}")))?;
        if let Some(key) = &self.api_key {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        setup: SetupPayload,
        outbound_capacity: usize,
        cancel: CancellationToken,
    ) -> Result<TransportLink> {
        let endpoint = self.endpoint()?;
        // The handshake races the session token so a stop issued while
        // Connecting aborts promptly instead of waiting out the dial.
        let (ws, _response) = tokio::select! {
            () = cancel.cancelled() => {
                return Err(VoxError::Transport("connection cancelled".into()));
            }
            result = connect_async(endpoint.as_str()) => {
                result.map_err(|e| VoxError::Transport(format!("connection failed: {e}")))?
            }
        };
        info!("transport connected to {}", self.url);

        let (mut write, mut read) = ws.split();

        // Session open carries the full configuration.
        let setup_json = serde_json::to_string(&ClientMessage::Setup { config: setup })
            .map_err(|e| VoxError::Transport(format!("cannot encode setup: {e}")))?;
        write
            .send(Message::Text(setup_json.into()))
            .await
            .map_err(|e| VoxError::Transport(format!("setup send failed: {e}")))?;

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientMessage>(outbound_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel::<ServerMessage>(outbound_capacity);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = outbound_rx.recv() => {
                        let Some(msg) = msg else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match serde_json::to_string(&msg) {
                            Ok(json) => json,
                            Err(e) => {
                                warn!("cannot encode outbound message: {e}");
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json.into())).await {
                            warn!("outbound send failed: {e}");
                            let _ = inbound_tx
                                .send(ServerMessage::Error { message: Some(e.to_string()) })
                                .await;
                            break;
                        }
                    }
                    frame = read.next() => {
                        match frame {
                            Some(Ok(Message::Text(text))) => {
                                match serde_json::from_str::<ServerMessage>(&text) {
                                    Ok(msg) => {
                                        if inbound_tx.send(msg).await.is_err() {
                                            break;
                                        }
                                    }
                                    // Unknown or malformed frames are tolerated,
                                    // never fatal to the session.
                                    Err(e) => debug!("ignoring unparseable frame: {e}"),
                                }
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                let _ = inbound_tx.send(ServerMessage::Closed).await;
                                break;
                            }
                            Some(Err(e)) => {
                                let _ = inbound_tx
                                    .send(ServerMessage::Error { message: Some(e.to_string()) })
                                    .await;
                                break;
                            }
                            // Binary, Ping/Pong frames handled by tungstenite.
                            _ => {}
                        }
                    }
                }
            }
            debug!("transport io task finished");
        });

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}
