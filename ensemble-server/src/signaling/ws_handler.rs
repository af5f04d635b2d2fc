use crate::AppState;
use crate::signaling::ConnectionSession;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let member_id = state.signaling.accept(tx);
    info!("New WebSocket connection: {}", member_id);

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut session = ConnectionSession::new(member_id, state.rooms.clone());

    loop {
        tokio::select! {
            _ = &mut send_task => break,

            frame = receiver.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = session.handle_text(text.as_str()).await {
                        warn!("Invalid envelope from {}: {}", member_id, e);
                    }
                }
                Some(Ok(Message::Binary(_))) => {
                    warn!("Binary frame from {} ignored", member_id);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket error from {}: {}", member_id, e);
                    break;
                }
            }
        }
    }

    send_task.abort();
    session.close().await;
    state.signaling.disconnect(&member_id);
    info!("WebSocket disconnected: {}", member_id);
}
