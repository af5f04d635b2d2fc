use crate::capability::MicStream;
use crate::transport::link_event::{LinkEvent, LinkId};
use anyhow::Result;
use async_trait::async_trait;
use ensemble_core::{IceCandidate, MemberId};
use tokio::sync::mpsc;

/// Which side of a pair sends the offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// One direct connection to a remote member. Owned exclusively by its PeerLink.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Open the data channel and produce the local offer SDP.
    async fn create_offer(&self) -> Result<String>;

    /// Apply a remote offer and produce the local answer SDP.
    async fn accept_offer(&self, sdp: String) -> Result<String>;

    async fn apply_answer(&self, sdp: String) -> Result<()>;

    /// Only valid once the remote description is set.
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<()>;

    async fn send_text(&self, text: String) -> Result<()>;

    async fn attach_audio(&self, stream: &MicStream) -> Result<()>;

    async fn detach_audio(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

/// Builds transports. Callbacks of the new transport report through `events`.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(
        &self,
        local: MemberId,
        link: LinkId,
        role: Role,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerTransport>>;
}
