use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use ensemble_core::{MemberId, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct SignalingInner {
    connections: DashMap<MemberId, mpsc::UnboundedSender<Message>>,
}

/// Registry of live WebSocket connections. Each member owns exactly one
/// outbound queue, which keeps delivery FIFO per destination.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl Default for SignalingService {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalingService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                connections: DashMap::new(),
            }),
        }
    }

    /// Register a fresh connection and hand out its identity.
    pub fn accept(&self, tx: mpsc::UnboundedSender<Message>) -> MemberId {
        let member_id = MemberId::new();
        self.inner.connections.insert(member_id, tx);
        member_id
    }

    pub fn disconnect(&self, member_id: &MemberId) {
        self.inner.connections.remove(member_id);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    fn send_text(&self, member_id: &MemberId, msg: &ServerMessage) {
        let Some(connection) = self.inner.connections.get(member_id) else {
            debug!("Skipping delivery to disconnected member {}", member_id);
            return;
        };

        match msg.to_text() {
            Ok(json) => {
                if let Err(e) = connection.send(Message::Text(json.into())) {
                    error!("Failed to queue WS message to {}: {:?}", member_id, e);
                }
            }
            Err(e) => error!("Failed to serialize server message: {}", e),
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn deliver(&self, member_id: &MemberId, msg: ServerMessage) {
        self.send_text(member_id, &msg);
    }
}
