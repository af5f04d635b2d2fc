use anyhow::{Context, Result};
use ensemble_core::{ClientMessage, ServerMessage};
use ensemble_server::{AppState, RoomConfig, router};
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Timeout for a single relay round trip (ms).
pub const RELAY_TIMEOUT_MS: u64 = 3000;

/// Boot a relay on an ephemeral port and return its WebSocket URL plus shared state.
pub async fn spawn_server(config: RoomConfig) -> (String, AppState) {
    let state = AppState::new(config);
    let app = router(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (format!("ws://{}/ws", addr), state)
}

/// Minimal relay client speaking the JSON envelope protocol over a real socket.
pub struct WsTestClient {
    stream: WsStream,
}

impl WsTestClient {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url)
            .await
            .context("Failed to connect to relay")?;
        Ok(Self { stream })
    }

    pub async fn send(&mut self, msg: &ClientMessage) -> Result<()> {
        let text = msg.to_text()?;
        self.send_raw(&text).await
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<()> {
        self.stream
            .send(Message::Text(text.to_owned().into()))
            .await
            .context("Failed to send frame")?;
        Ok(())
    }

    /// Next server envelope, skipping control frames.
    pub async fn recv(&mut self) -> Result<ServerMessage> {
        let timeout = std::time::Duration::from_millis(RELAY_TIMEOUT_MS);

        loop {
            let frame = tokio::time::timeout(timeout, self.stream.next())
                .await
                .context("Timeout waiting for server message")?;

            match frame {
                Some(Ok(Message::Text(text))) => return Ok(ServerMessage::parse(text.as_str())?),
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("Relay closed the socket"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Assert that nothing arrives within `wait_ms`.
    pub async fn expect_silence(&mut self, wait_ms: u64) -> Result<()> {
        let wait = std::time::Duration::from_millis(wait_ms);
        match tokio::time::timeout(wait, self.stream.next()).await {
            Err(_) => Ok(()),
            Ok(frame) => anyhow::bail!("Unexpected frame: {:?}", frame),
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream
            .close(None)
            .await
            .context("Failed to close socket")?;
        Ok(())
    }
}
