use ensemble_core::{MemberId, MemberInfo, SignalPayload};
use tokio::sync::oneshot;

/// Commands a room actor receives from connection sessions.
#[derive(Debug)]
pub enum RoomCommand {
    /// `join-room`: admit the member unless the room is at capacity.
    Join {
        member_id: MemberId,
        nickname: String,
        reply: oneshot::Sender<JoinOutcome>,
    },

    /// Explicit `leave-room` or a dropped socket.
    Leave {
        member_id: MemberId,
        reply: Option<oneshot::Sender<Vec<MemberId>>>,
    },

    /// Forward handshake metadata to one other member.
    Signal {
        from: MemberId,
        to: MemberId,
        signal: SignalPayload,
    },

    UpdateInstrument {
        member_id: MemberId,
        instrument: String,
    },

    /// Relay fallback for peer events when no data channel is available.
    DataMessage {
        from: MemberId,
        message: serde_json::Value,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    Accepted { existing: Vec<MemberInfo> },
    RoomFull,
    /// The room emptied and shut down before this command was read; retry on a fresh room.
    Closed,
}
