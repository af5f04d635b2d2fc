use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use bytes::Bytes;
use ensemble_client::{LinkEvent, LinkId, MicStream, PeerTransport, Role, TransportFactory};
use ensemble_core::{IceCandidate, MemberId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

struct Endpoint {
    link: LinkId,
    events: mpsc::UnboundedSender<LinkEvent>,
    remote_description: bool,
    connected: bool,
    audio: Option<String>,
}

#[derive(Default)]
struct NetworkState {
    /// Keyed by (local, remote).
    endpoints: HashMap<(MemberId, MemberId), Endpoint>,
    audio_only: bool,
}

impl NetworkState {
    /// Both halves have both descriptions: "ICE" completes on each side.
    fn maybe_connect(&mut self, local: MemberId, remote: MemberId) {
        let ready = |state: &NetworkState, key: (MemberId, MemberId)| {
            state
                .endpoints
                .get(&key)
                .is_some_and(|e: &Endpoint| e.remote_description && !e.connected)
        };
        if !ready(self, (local, remote)) || !ready(self, (remote, local)) {
            return;
        }

        let audio_only = self.audio_only;
        for (from, to) in [(local, remote), (remote, local)] {
            let incoming_audio = self.endpoints.get(&(to, from)).and_then(|e| e.audio.clone());
            if let Some(endpoint) = self.endpoints.get_mut(&(from, to)) {
                endpoint.connected = true;
                let _ = endpoint.events.send(LinkEvent::IceConnected(endpoint.link));
                if !audio_only {
                    let _ = endpoint.events.send(LinkEvent::DataChannelOpen(endpoint.link));
                }
                if let Some(stream_id) = incoming_audio {
                    let _ = endpoint
                        .events
                        .send(LinkEvent::RemoteMedia(endpoint.link, stream_id));
                }
            }
        }
    }
}

/// In-process stand-in for the network between participants. Negotiation is
/// simulated: a pair connects once both sides hold a remote description.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

impl LoopbackNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Links connect through ICE but never open a data channel.
    pub fn audio_only() -> Self {
        let network = Self::default();
        network.state.lock().unwrap().audio_only = true;
        network
    }

    pub fn factory(&self) -> Arc<LoopbackFactory> {
        Arc::new(LoopbackFactory {
            network: self.clone(),
        })
    }

    /// Number of live transport halves.
    pub fn endpoints(&self) -> usize {
        self.state.lock().unwrap().endpoints.len()
    }
}

pub struct LoopbackFactory {
    network: LoopbackNetwork,
}

#[async_trait]
impl TransportFactory for LoopbackFactory {
    async fn connect(
        &self,
        local: MemberId,
        link: LinkId,
        _role: Role,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Box<dyn PeerTransport>> {
        let endpoint = Endpoint {
            link,
            events,
            remote_description: false,
            connected: false,
            audio: None,
        };
        self.network
            .state
            .lock()
            .unwrap()
            .endpoints
            .insert((local, link.remote), endpoint);

        Ok(Box::new(LoopbackTransport {
            local,
            link,
            network: self.network.clone(),
        }))
    }
}

pub struct LoopbackTransport {
    local: MemberId,
    link: LinkId,
    network: LoopbackNetwork,
}

impl LoopbackTransport {
    fn key(&self) -> (MemberId, MemberId) {
        (self.local, self.link.remote)
    }

    fn with_endpoint<T>(&self, f: impl FnOnce(&mut Endpoint) -> T) -> Result<T> {
        let mut state = self.network.state.lock().unwrap();
        match state.endpoints.get_mut(&self.key()) {
            Some(endpoint) if endpoint.link == self.link => Ok(f(endpoint)),
            _ => Err(anyhow!("transport {} is closed", self.link)),
        }
    }

    fn trickle(&self) -> Result<()> {
        let candidate = IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 127.0.0.1 9 typ host", self.local),
            sdp_mid: Some("0".to_string()),
            sdp_m_line_index: Some(0),
            username_fragment: None,
        };
        self.with_endpoint(|e| {
            let _ = e.events.send(LinkEvent::LocalCandidate(e.link, candidate));
        })
    }

    fn set_remote_description(&self) -> Result<()> {
        self.with_endpoint(|e| e.remote_description = true)?;
        self.network
            .state
            .lock()
            .unwrap()
            .maybe_connect(self.local, self.link.remote);
        Ok(())
    }
}

#[async_trait]
impl PeerTransport for LoopbackTransport {
    async fn create_offer(&self) -> Result<String> {
        self.trickle()?;
        Ok(format!("offer from {}", self.local))
    }

    async fn accept_offer(&self, _sdp: String) -> Result<String> {
        self.set_remote_description()?;
        self.trickle()?;
        Ok(format!("answer from {}", self.local))
    }

    async fn apply_answer(&self, _sdp: String) -> Result<()> {
        self.set_remote_description()
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<()> {
        if !self.with_endpoint(|e| e.remote_description)? {
            bail!("candidate before remote description on {}", self.link);
        }
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<()> {
        let state = self.network.state.lock().unwrap();
        let peer = state
            .endpoints
            .get(&(self.link.remote, self.local))
            .filter(|e| e.connected && !state.audio_only)
            .ok_or_else(|| anyhow!("no open data channel on {}", self.link))?;
        let _ = peer
            .events
            .send(LinkEvent::Message(peer.link, Bytes::from(text)));
        Ok(())
    }

    async fn attach_audio(&self, stream: &MicStream) -> Result<()> {
        let connected = self.with_endpoint(|e| {
            e.audio = Some(stream.id().to_string());
            e.connected
        })?;
        if connected {
            let state = self.network.state.lock().unwrap();
            if let Some(peer) = state.endpoints.get(&(self.link.remote, self.local)) {
                let _ = peer
                    .events
                    .send(LinkEvent::RemoteMedia(peer.link, stream.id().to_string()));
            }
        }
        Ok(())
    }

    async fn detach_audio(&self) -> Result<()> {
        self.with_endpoint(|e| e.audio = None)
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.network.state.lock().unwrap();
        if state
            .endpoints
            .get(&self.key())
            .is_some_and(|e| e.link == self.link)
        {
            state.endpoints.remove(&self.key());
        }
        Ok(())
    }
}
