use crate::transport::{LinkId, PeerTransport, Role};
use ensemble_core::{IceCandidate, MemberId};
use tokio::time::Instant;

/// Liveness of one PeerLink. A link that does not exist is "absent";
/// closing a link removes it from the arena, so closed links are absent too.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Negotiating,
    Connected,
}

/// Coordinator-owned record of the connection to one remote member.
pub struct PeerLink {
    id: LinkId,
    role: Role,
    state: LinkState,
    transport: Box<dyn PeerTransport>,
    remote_description_set: bool,
    pending_candidates: Vec<IceCandidate>,
    data_channel_open: bool,
    remote_stream: Option<String>,
    started_at: Instant,
}

impl PeerLink {
    pub fn new(id: LinkId, role: Role, transport: Box<dyn PeerTransport>) -> Self {
        Self {
            id,
            role,
            state: LinkState::Negotiating,
            transport,
            remote_description_set: false,
            pending_candidates: Vec::new(),
            data_channel_open: false,
            remote_stream: None,
            started_at: Instant::now(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn remote(&self) -> MemberId {
        self.id.remote
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn transport(&self) -> &dyn PeerTransport {
        self.transport.as_ref()
    }

    pub fn is_data_channel_open(&self) -> bool {
        self.data_channel_open
    }

    pub fn remote_stream(&self) -> Option<&str> {
        self.remote_stream.as_deref()
    }

    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set
    }

    /// Returns candidates that arrived early; they must be applied now.
    pub fn remote_description_applied(&mut self) -> Vec<IceCandidate> {
        self.remote_description_set = true;
        std::mem::take(&mut self.pending_candidates)
    }

    pub fn queue_candidate(&mut self, candidate: IceCandidate) {
        self.pending_candidates.push(candidate);
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    /// Negotiating -> Connected. Returns true on the actual transition.
    pub fn mark_connected(&mut self) -> bool {
        if self.state == LinkState::Negotiating {
            self.state = LinkState::Connected;
            return true;
        }
        false
    }

    pub fn set_data_channel_open(&mut self, open: bool) {
        self.data_channel_open = open;
    }

    pub fn set_remote_stream(&mut self, stream_id: String) {
        self.remote_stream = Some(stream_id);
    }

    pub fn is_stale(&self, now: Instant, timeout: std::time::Duration) -> bool {
        self.state == LinkState::Negotiating && now.duration_since(self.started_at) >= timeout
    }

    /// Release the connection and any inbound stream.
    pub async fn close(self) {
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Closing link {} failed: {:#}", self.id, e);
        }
    }
}
