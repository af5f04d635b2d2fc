use ensemble_core::{ProtocolError, RoomId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("room '{0}' is full")]
    RoomFull(RoomId),

    #[error("signaling channel closed")]
    SignalingClosed,

    /// The coordinator task is gone (left the session or crashed).
    #[error("mesh coordinator stopped")]
    Stopped,

    #[error("instrument '{0}' could not be loaded")]
    InstrumentUnavailable(String),

    #[error("microphone unavailable: {0}")]
    Microphone(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
