use crate::room::{JoinError, RoomManager};
use ensemble_core::{ClientMessage, MemberId, ProtocolError, RoomId};
use tracing::{debug, info, warn};

/// Per-connection protocol state: which room (if any) this member is in.
///
/// All client envelopes of one connection pass through one session in
/// arrival order, so per-connection FIFO carries through to the rooms.
pub struct ConnectionSession {
    member_id: MemberId,
    rooms: RoomManager,
    room: Option<RoomId>,
}

impl ConnectionSession {
    pub fn new(member_id: MemberId, rooms: RoomManager) -> Self {
        Self {
            member_id,
            rooms,
            room: None,
        }
    }

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    /// Parse and handle one text frame. Malformed frames are reported and
    /// otherwise ignored; the connection stays usable.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), ProtocolError> {
        let msg = ClientMessage::parse(text)?;
        self.handle(msg).await;
        Ok(())
    }

    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::JoinRoom { room_id, nickname } => self.join(room_id, nickname).await,

            ClientMessage::LeaveRoom {} => self.leave().await,

            ClientMessage::Signal { to, signal } => {
                let Some(room) = &self.room else {
                    debug!("{} sent a signal outside any room", self.member_id);
                    return;
                };
                self.rooms.relay(room, self.member_id, to, signal).await;
            }

            ClientMessage::UpdateInstrument { instrument } => {
                let Some(room) = &self.room else {
                    debug!("{} changed instrument outside any room", self.member_id);
                    return;
                };
                self.rooms
                    .update_instrument(room, self.member_id, instrument)
                    .await;
            }

            ClientMessage::DataChannelMessage { message } => {
                let Some(room) = &self.room else {
                    return;
                };
                self.rooms
                    .broadcast_data(room, self.member_id, message)
                    .await;
            }
        }
    }

    async fn join(&mut self, room_id: RoomId, nickname: String) {
        if let Some(previous) = &self.room {
            warn!(
                "{} re-joined ('{}' -> '{}') without leaving; leaving '{}' first",
                self.member_id, previous, room_id, previous
            );
            self.leave().await;
        }

        match self.rooms.join(self.member_id, &room_id, &nickname).await {
            Ok(existing) => {
                debug!(
                    "{} admitted to '{}' with {} existing members",
                    self.member_id,
                    room_id,
                    existing.len()
                );
                self.room = Some(room_id);
            }
            Err(JoinError::RoomFull { room, capacity }) => {
                info!(
                    "{} refused from '{}' (capacity {})",
                    self.member_id, room, capacity
                );
            }
        }
    }

    async fn leave(&mut self) {
        let Some(room) = self.room.take() else {
            return;
        };
        let remaining = self.rooms.leave(self.member_id, &room).await;
        debug!(
            "{} left '{}', {} members remain",
            self.member_id,
            room,
            remaining.len()
        );
    }

    /// Connection lost: same cleanup as an explicit leave.
    pub async fn close(&mut self) {
        self.leave().await;
    }
}
