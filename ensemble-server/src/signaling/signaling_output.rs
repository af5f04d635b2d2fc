use async_trait::async_trait;
use ensemble_core::{MemberId, ServerMessage};

/// Outbound half of the relay: how a room reaches a member's live connection.
///
/// Delivery is fire-and-forget. A member whose connection is already gone is
/// skipped without reporting back to the room.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    async fn deliver(&self, member_id: &MemberId, msg: ServerMessage);
}
