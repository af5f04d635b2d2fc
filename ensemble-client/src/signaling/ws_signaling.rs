use crate::error::MeshError;
use crate::signaling::signal_sink::SignalSink;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ensemble_core::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Relay connection over a WebSocket. Inbound envelopes are parsed and
/// handed out through the receiver returned by `connect`.
pub struct WsSignaling {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
}

impl WsSignaling {
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<ServerMessage>)> {
        let (stream, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to relay at {}", url))?;
        info!("Connected to relay at {}", url);

        let (mut ws_sender, mut ws_receiver) = stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = ws_sender.send(msg).await {
                    error!("Relay send failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_receiver.next().await {
                match frame {
                    Ok(Message::Text(text)) => match ServerMessage::parse(text.as_str()) {
                        Ok(msg) => {
                            if inbound_tx.send(msg).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Malformed relay frame ignored: {}", e),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Relay socket error: {}", e);
                        break;
                    }
                }
            }
            debug!("Relay reader finished");
        });

        Ok((Self { outbound, reader }, inbound_rx))
    }
}

#[async_trait]
impl SignalSink for WsSignaling {
    async fn send(&self, msg: ClientMessage) -> Result<(), MeshError> {
        let text = msg.to_text()?;
        self.outbound
            .send(Message::Text(text.into()))
            .map_err(|_| MeshError::SignalingClosed)
    }

    async fn close(&self) {
        let _ = self.outbound.send(Message::Close(None));
        self.reader.abort();
    }
}
