use crate::error::MeshError;
use async_trait::async_trait;
use ensemble_core::ClientMessage;

/// Outbound half of the relay connection.
#[async_trait]
pub trait SignalSink: Send + Sync {
    async fn send(&self, msg: ClientMessage) -> Result<(), MeshError>;

    /// Close the relay connection. Further sends fail.
    async fn close(&self);
}
