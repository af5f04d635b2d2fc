mod member;
mod peer_event;
mod room;
mod signaling;

pub use member::{MemberId, MemberInfo};
pub use peer_event::PeerEvent;
pub use room::{RoomId, RoomStatus};
pub use signaling::{ClientMessage, IceCandidate, IceServerConfig, ServerMessage, SignalPayload};
