use bytes::Bytes;
use ensemble_core::{IceCandidate, MemberId};
use std::fmt;

/// Identifies one incarnation of a PeerLink. A replaced or closed link keeps
/// its epoch, so late callbacks from its transport can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId {
    pub remote: MemberId,
    pub epoch: u64,
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.remote, self.epoch)
    }
}

/// Events a transport reports back to the mesh coordinator.
#[derive(Debug)]
pub enum LinkEvent {
    /// Trickle ICE: forward to the remote through the relay.
    LocalCandidate(LinkId, IceCandidate),

    IceConnected(LinkId),

    /// ICE reached failed, disconnected or closed.
    IceFailed(LinkId, String),

    DataChannelOpen(LinkId),

    DataChannelClosed(LinkId),

    /// Raw payload received on the data channel.
    Message(LinkId, Bytes),

    /// The remote started sending media; carries its stream id.
    RemoteMedia(LinkId, String),
}

impl LinkEvent {
    pub fn link(&self) -> LinkId {
        match self {
            LinkEvent::LocalCandidate(link, _)
            | LinkEvent::IceConnected(link)
            | LinkEvent::IceFailed(link, _)
            | LinkEvent::DataChannelOpen(link)
            | LinkEvent::DataChannelClosed(link)
            | LinkEvent::Message(link, _)
            | LinkEvent::RemoteMedia(link, _) => *link,
        }
    }
}
