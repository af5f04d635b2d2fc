use crate::capability::{InstrumentPlayer, MicStream, Microphone};
use crate::config::MeshConfig;
use crate::error::MeshError;
use crate::mesh::mesh_handle::{LinkSnapshot, MeshCommand, MeshHandle, MeshSnapshot};
use crate::mesh::peer_link::PeerLink;
use crate::mesh::roster::Roster;
use crate::signaling::SignalSink;
use crate::transport::{LinkEvent, LinkId, Role, TransportFactory};
use ensemble_core::utils::DEFAULT_INSTRUMENT;
use ensemble_core::{
    ClientMessage, IceCandidate, MemberId, MemberInfo, PeerEvent, RoomId, ServerMessage,
    SignalPayload,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// External capabilities the mesh drives but does not implement.
#[derive(Clone)]
pub struct Collaborators {
    pub player: Arc<dyn InstrumentPlayer>,
    pub microphone: Arc<dyn Microphone>,
}

type JoinReply = oneshot::Sender<Result<MemberId, MeshError>>;

/// Peer mesh coordinator. One per participant.
///
/// Owns every PeerLink of the local member and is the only place their
/// state changes: relay envelopes, transport callbacks and application
/// commands are all funnelled into `run`, so no link is ever touched
/// concurrently and the microphone toggle is atomic with respect to link
/// creation.
pub struct MeshCoordinator {
    config: MeshConfig,
    local: Option<MemberId>,
    room: Option<RoomId>,
    pending_join: Option<(RoomId, JoinReply)>,
    instrument: String,
    loaded: HashSet<String>,
    links: HashMap<MemberId, PeerLink>,
    roster: Roster,
    next_epoch: u64,
    mic: Option<MicStream>,
    torn_down: bool,
    signals: Arc<dyn SignalSink>,
    factory: Arc<dyn TransportFactory>,
    player: Arc<dyn InstrumentPlayer>,
    microphone: Arc<dyn Microphone>,
    command_rx: mpsc::Receiver<MeshCommand>,
    inbound: mpsc::UnboundedReceiver<ServerMessage>,
    event_tx: mpsc::UnboundedSender<LinkEvent>,
    event_rx: mpsc::UnboundedReceiver<LinkEvent>,
}

impl MeshCoordinator {
    pub fn new(
        config: MeshConfig,
        signals: Arc<dyn SignalSink>,
        inbound: mpsc::UnboundedReceiver<ServerMessage>,
        factory: Arc<dyn TransportFactory>,
        collaborators: Collaborators,
    ) -> (Self, MeshHandle) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let coordinator = Self {
            config,
            local: None,
            room: None,
            pending_join: None,
            instrument: DEFAULT_INSTRUMENT.to_owned(),
            loaded: HashSet::new(),
            links: HashMap::new(),
            roster: Roster::new(),
            next_epoch: 0,
            mic: None,
            torn_down: false,
            signals,
            factory,
            player: collaborators.player,
            microphone: collaborators.microphone,
            command_rx,
            inbound,
            event_tx,
            event_rx,
        };

        (coordinator, MeshHandle::new(command_tx))
    }

    /// Event loop. Returns after `leave`, when every handle is dropped, or
    /// when the relay connection is lost.
    pub async fn run(mut self) {
        info!("Mesh coordinator started");

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(MeshCommand::Leave { reply }) => {
                        self.teardown(true).await;
                        let _ = reply.send(());
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd).await,
                    None => {
                        self.teardown(true).await;
                        break;
                    }
                },

                msg = self.inbound.recv() => match msg {
                    Some(msg) => self.handle_server_message(msg).await,
                    None => {
                        warn!("Relay connection lost");
                        self.teardown(false).await;
                        break;
                    }
                },

                Some(event) = self.event_rx.recv() => self.handle_link_event(event).await,

                _ = sweep.tick() => self.expire_stale_links().await,
            }
        }

        info!("Mesh coordinator finished");
    }

    async fn handle_command(&mut self, cmd: MeshCommand) {
        match cmd {
            MeshCommand::Join {
                room_id,
                nickname,
                reply,
            } => self.join(room_id, nickname, reply).await,

            MeshCommand::NoteOn { note, duration } => {
                let event = PeerEvent::NoteOn {
                    instrument: self.instrument.clone(),
                    note,
                    duration,
                };
                self.fan_out(&event).await;
            }

            MeshCommand::NoteOff { note } => {
                let event = PeerEvent::NoteOff {
                    instrument: self.instrument.clone(),
                    note,
                };
                self.fan_out(&event).await;
            }

            MeshCommand::SetInstrument { instrument, reply } => {
                let result = self.change_instrument(instrument).await;
                let _ = reply.send(result);
            }

            MeshCommand::SetMicrophone { enabled, reply } => {
                let result = self.toggle_microphone(enabled).await;
                let _ = reply.send(result);
            }

            MeshCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }

            MeshCommand::Leave { reply } => {
                self.teardown(true).await;
                let _ = reply.send(());
            }
        }
    }

    async fn join(&mut self, room_id: RoomId, nickname: String, reply: JoinReply) {
        if self.torn_down {
            let _ = reply.send(Err(MeshError::Stopped));
            return;
        }
        if self.room.is_some() {
            self.leave_room().await;
        }

        info!("Joining room '{}' as '{}'", room_id, nickname);
        let msg = ClientMessage::JoinRoom {
            room_id: room_id.clone(),
            nickname,
        };
        match self.signals.send(msg).await {
            Ok(()) => self.pending_join = Some((room_id, reply)),
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    /// Drop every link and the roster without ending the session.
    async fn leave_room(&mut self) {
        if let Err(e) = self.signals.send(ClientMessage::LeaveRoom {}).await {
            warn!("Could not announce leave: {}", e);
        }
        self.close_all_links().await;
        self.roster.clear();
        self.room = None;
    }

    pub(crate) async fn handle_server_message(&mut self, msg: ServerMessage) {
        if self.torn_down {
            debug!("Session torn down, ignoring {:?}", msg);
            return;
        }

        match msg {
            ServerMessage::JoinSuccess { id, users } => self.on_joined(id, users).await,

            ServerMessage::RoomFull {} => match self.pending_join.take() {
                Some((room_id, reply)) => {
                    info!("Room '{}' is full", room_id);
                    let _ = reply.send(Err(MeshError::RoomFull(room_id)));
                }
                None => warn!("Unsolicited room-full"),
            },

            ServerMessage::UserJoined(info) => {
                if Some(info.id) == self.local {
                    return;
                }
                info!("{} ('{}') joined", info.id, info.nickname);
                self.load_instrument(&info.instrument).await;
                // Newcomer initiates; wait for its offer.
                self.roster.insert(info);
            }

            ServerMessage::UserLeft { id } => {
                if let Some(info) = self.roster.remove(&id) {
                    info!("{} ('{}') left", id, info.nickname);
                }
                self.close_link(&id).await;
            }

            ServerMessage::Signal {
                from,
                from_nickname,
                signal,
            } => self.handle_signal(from, from_nickname, signal).await,

            ServerMessage::UserInstrumentUpdated { id, instrument } => {
                self.update_remote_instrument(id, instrument).await
            }

            ServerMessage::DataChannelMessage { from, message } => {
                match PeerEvent::from_value(message) {
                    Ok(event) => self.apply_peer_event(from, event).await,
                    Err(e) => warn!("Malformed relayed event from {}: {}", from, e),
                }
            }
        }
    }

    async fn on_joined(&mut self, id: MemberId, users: Vec<MemberInfo>) {
        let Some((room_id, reply)) = self.pending_join.take() else {
            warn!("Unsolicited join-success ignored");
            return;
        };

        info!(
            "Joined '{}' as {} with {} members present",
            room_id,
            id,
            users.len()
        );
        self.close_all_links().await;
        self.local = Some(id);
        self.room = Some(room_id);
        self.roster.seed(users.iter().cloned());
        let _ = reply.send(Ok(id));

        if self.instrument != DEFAULT_INSTRUMENT {
            let msg = ClientMessage::UpdateInstrument {
                instrument: self.instrument.clone(),
            };
            if let Err(e) = self.signals.send(msg).await {
                warn!("Could not announce instrument: {}", e);
            }
        }

        // Newcomer is the initiator toward everyone already present.
        for user in users {
            self.load_instrument(&user.instrument).await;
            self.start_offer(user.id).await;
        }
    }

    async fn handle_signal(&mut self, from: MemberId, from_nickname: String, signal: SignalPayload) {
        // While a join is pending, signals still come from the previous room.
        if self.local.is_none() || self.room.is_none() || Some(from) == self.local {
            debug!("Dropping {} from {}: not in a room", signal.kind(), from);
            return;
        }

        match signal {
            SignalPayload::Offer { sdp } => self.handle_offer(from, from_nickname, sdp).await,
            SignalPayload::Answer { sdp } => self.handle_answer(from, sdp).await,
            SignalPayload::Candidate { candidate } => self.handle_candidate(from, candidate).await,
        }
    }

    /// absent -> negotiating as initiator.
    async fn start_offer(&mut self, remote: MemberId) {
        if !self.open_link(remote, Role::Initiator).await {
            return;
        }
        let Some(link) = self.links.get(&remote) else {
            return;
        };
        let offer = link.transport().create_offer().await;

        match offer {
            Ok(sdp) => {
                debug!("Sending offer to {}", remote);
                self.send_signal(remote, SignalPayload::Offer { sdp }).await;
            }
            Err(e) => {
                error!("Could not create offer for {}: {:#}", remote, e);
                self.fail_link(&remote, "offer failed").await;
            }
        }
    }

    /// absent -> negotiating as responder. An existing link is replaced.
    async fn handle_offer(&mut self, from: MemberId, from_nickname: String, sdp: String) {
        if !self.roster.contains(&from) {
            self.roster.insert(MemberInfo::new(from, from_nickname));
        }
        if !self.open_link(from, Role::Responder).await {
            return;
        }
        let Some(link) = self.links.get_mut(&from) else {
            return;
        };

        let accepted = link.transport().accept_offer(sdp).await;
        let answer = match accepted {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Offer from {} rejected: {:#}", from, e);
                self.fail_link(&from, "offer rejected").await;
                return;
            }
        };
        let early = link.remote_description_applied();
        self.apply_candidates(&from, early).await;

        debug!("Sending answer to {}", from);
        self.send_signal(from, SignalPayload::Answer { sdp: answer }).await;
    }

    async fn handle_answer(&mut self, from: MemberId, sdp: String) {
        let Some(link) = self.links.get_mut(&from) else {
            debug!("Answer from {} without a link dropped", from);
            return;
        };
        if link.role() != Role::Initiator || link.has_remote_description() {
            warn!("Unexpected answer from {} on {}", from, link.id());
            return;
        }

        let applied = link.transport().apply_answer(sdp).await;
        if let Err(e) = applied {
            warn!("Answer from {} rejected: {:#}", from, e);
            self.fail_link(&from, "answer rejected").await;
            return;
        }
        let early = link.remote_description_applied();
        self.apply_candidates(&from, early).await;
    }

    async fn handle_candidate(&mut self, from: MemberId, candidate: IceCandidate) {
        let Some(link) = self.links.get_mut(&from) else {
            debug!("Candidate from {} without a link dropped", from);
            return;
        };

        if link.has_remote_description() {
            if let Err(e) = link.transport().add_ice_candidate(candidate).await {
                warn!("Candidate from {} rejected: {:#}", from, e);
            }
        } else {
            link.queue_candidate(candidate);
            debug!(
                "Queued candidate on {} ({} pending)",
                link.id(),
                link.pending_candidates()
            );
        }
    }

    async fn apply_candidates(&self, remote: &MemberId, candidates: Vec<IceCandidate>) {
        let Some(link) = self.links.get(remote) else {
            return;
        };
        if !candidates.is_empty() {
            debug!("Applying {} queued candidates on {}", candidates.len(), link.id());
        }
        for candidate in candidates {
            if let Err(e) = link.transport().add_ice_candidate(candidate).await {
                warn!("Queued candidate on {} rejected: {:#}", link.id(), e);
            }
        }
    }

    /// Create a fresh link, closing any previous one to the same member.
    async fn open_link(&mut self, remote: MemberId, role: Role) -> bool {
        let Some(local) = self.local else {
            return false;
        };
        if let Some(old) = self.links.remove(&remote) {
            info!("Replacing link {}", old.id());
            old.close().await;
        }

        self.next_epoch += 1;
        let link_id = LinkId {
            remote,
            epoch: self.next_epoch,
        };
        let transport = match self
            .factory
            .connect(local, link_id, role, self.event_tx.clone())
            .await
        {
            Ok(transport) => transport,
            Err(e) => {
                error!("Could not open transport to {}: {:#}", remote, e);
                self.roster.remove(&remote);
                return false;
            }
        };

        if let Some(stream) = &self.mic {
            if let Err(e) = transport.attach_audio(stream).await {
                warn!("Could not attach microphone to {}: {:#}", link_id, e);
            }
        }

        info!("Negotiating {} as {:?}", link_id, role);
        self.links
            .insert(remote, PeerLink::new(link_id, role, transport));
        true
    }

    pub(crate) async fn handle_link_event(&mut self, event: LinkEvent) {
        let id = event.link();
        let Some(link) = self
            .links
            .get_mut(&id.remote)
            .filter(|link| link.id() == id)
        else {
            debug!("Stale event for {} ignored", id);
            return;
        };

        match event {
            LinkEvent::LocalCandidate(_, candidate) => {
                self.send_signal(id.remote, SignalPayload::Candidate { candidate })
                    .await;
            }

            LinkEvent::IceConnected(_) => {
                if link.mark_connected() {
                    info!("Link {} connected (ICE)", id);
                }
            }

            LinkEvent::DataChannelOpen(_) => {
                link.set_data_channel_open(true);
                if link.mark_connected() {
                    info!("Link {} connected (data channel)", id);
                }
            }

            LinkEvent::DataChannelClosed(_) => link.set_data_channel_open(false),

            LinkEvent::IceFailed(_, state) => {
                warn!("Link {} lost, ICE {}", id, state);
                self.fail_link(&id.remote, "ICE failure").await;
            }

            LinkEvent::Message(_, data) => match PeerEvent::from_slice(&data) {
                Ok(event) => self.apply_peer_event(id.remote, event).await,
                Err(e) => warn!("Malformed peer event on {}: {}", id, e),
            },

            LinkEvent::RemoteMedia(_, stream_id) => {
                debug!("Inbound stream '{}' on {}", stream_id, id);
                link.set_remote_stream(stream_id);
            }
        }
    }

    async fn apply_peer_event(&mut self, from: MemberId, event: PeerEvent) {
        match event {
            PeerEvent::NoteOn {
                instrument,
                note,
                duration,
            } => self.player.note_on(&instrument, &note, duration.as_deref()),
            PeerEvent::NoteOff { instrument, note } => self.player.note_off(&instrument, &note),
            PeerEvent::InstrumentChange { instrument } => {
                self.update_remote_instrument(from, instrument).await
            }
        }
    }

    async fn update_remote_instrument(&mut self, id: MemberId, instrument: String) {
        if self.roster.set_instrument(&id, &instrument) {
            info!("{} now plays '{}'", id, instrument);
            self.load_instrument(&instrument).await;
        } else {
            debug!("Instrument update for unknown member {}", id);
        }
    }

    async fn load_instrument(&mut self, name: &str) {
        if self.loaded.contains(name) {
            return;
        }
        match self.player.load_instrument(name).await {
            Ok(()) => {
                self.loaded.insert(name.to_owned());
            }
            Err(e) => warn!("Instrument '{}' failed to load: {:#}", name, e),
        }
    }

    async fn change_instrument(&mut self, instrument: String) -> Result<(), MeshError> {
        if let Err(e) = self.player.load_instrument(&instrument).await {
            warn!("Instrument '{}' failed to load: {:#}", instrument, e);
            return Err(MeshError::InstrumentUnavailable(instrument));
        }
        self.loaded.insert(instrument.clone());
        self.instrument = instrument.clone();

        if self.room.is_some() {
            self.signals
                .send(ClientMessage::UpdateInstrument {
                    instrument: instrument.clone(),
                })
                .await?;
            self.fan_out(&PeerEvent::InstrumentChange { instrument })
                .await;
        }
        Ok(())
    }

    /// Send `event` over every open data channel. Falls back to the relay
    /// only while no channel is open at all.
    async fn fan_out(&self, event: &PeerEvent) {
        if self.room.is_none() {
            debug!("Not in a room, {:?} dropped", event);
            return;
        }
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!("Could not encode {:?}: {}", event, e);
                return;
            }
        };

        let mut delivered = 0;
        for link in self.links.values().filter(|l| l.is_data_channel_open()) {
            match link.transport().send_text(text.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Send on {} failed: {:#}", link.id(), e),
            }
        }

        if delivered == 0 && !self.roster.is_empty() {
            debug!("No open data channel, relaying {:?}", event);
            let message = match serde_json::to_value(event) {
                Ok(message) => message,
                Err(e) => {
                    error!("Could not encode {:?}: {}", event, e);
                    return;
                }
            };
            if let Err(e) = self
                .signals
                .send(ClientMessage::DataChannelMessage { message })
                .await
            {
                warn!("Relay fallback failed: {}", e);
            }
        }
    }

    async fn toggle_microphone(&mut self, enabled: bool) -> Result<bool, MeshError> {
        if enabled {
            if self.mic.is_none() {
                let stream = self
                    .microphone
                    .open()
                    .await
                    .map_err(|e| MeshError::Microphone(format!("{:#}", e)))?;
                for link in self.links.values() {
                    if let Err(e) = link.transport().attach_audio(&stream).await {
                        warn!("Could not attach microphone to {}: {:#}", link.id(), e);
                    }
                }
                info!("Microphone on ({} links)", self.links.len());
                self.mic = Some(stream);
            }
            return Ok(true);
        }

        if self.mic.take().is_some() {
            for link in self.links.values() {
                if let Err(e) = link.transport().detach_audio().await {
                    warn!("Could not detach microphone from {}: {:#}", link.id(), e);
                }
            }
            self.microphone.close().await;
            info!("Microphone off");
        }
        Ok(false)
    }

    /// Timeout for links stuck negotiating, e.g. when the remote vanished mid-handshake.
    pub(crate) async fn expire_stale_links(&mut self) {
        let now = Instant::now();
        let stale: Vec<MemberId> = self
            .links
            .values()
            .filter(|link| link.is_stale(now, self.config.negotiation_timeout))
            .map(PeerLink::remote)
            .collect();

        for remote in stale {
            self.fail_link(&remote, "negotiation timed out").await;
        }
    }

    async fn send_signal(&self, to: MemberId, signal: SignalPayload) {
        if let Err(e) = self.signals.send(ClientMessage::Signal { to, signal }).await {
            warn!("Signal to {} not sent: {}", to, e);
        }
    }

    async fn close_link(&mut self, remote: &MemberId) {
        if let Some(link) = self.links.remove(remote) {
            info!("Closing link {}", link.id());
            link.close().await;
        }
    }

    /// Negotiation failure: same as the peer leaving, from our point of view.
    async fn fail_link(&mut self, remote: &MemberId, reason: &str) {
        if let Some(link) = self.links.remove(remote) {
            warn!("Dropping link {}: {}", link.id(), reason);
            link.close().await;
        }
        if let Some(info) = self.roster.remove(remote) {
            info!("{} ('{}') dropped from roster", info.id, info.nickname);
        }
    }

    async fn close_all_links(&mut self) {
        let links: Vec<PeerLink> = self.links.drain().map(|(_, link)| link).collect();
        for link in links {
            link.close().await;
        }
    }

    /// Close every link and the relay connection. Anything arriving later is ignored.
    pub(crate) async fn teardown(&mut self, announce: bool) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some((_, reply)) = self.pending_join.take() {
            let _ = reply.send(Err(MeshError::SignalingClosed));
        }
        if announce && self.room.is_some() {
            let _ = self.signals.send(ClientMessage::LeaveRoom {}).await;
        }

        self.close_all_links().await;
        if self.mic.take().is_some() {
            self.microphone.close().await;
        }
        self.roster.clear();
        self.room = None;
        self.signals.close().await;

        info!("Mesh torn down");
    }

    fn snapshot(&self) -> MeshSnapshot {
        let mut links: Vec<LinkSnapshot> = self
            .links
            .values()
            .map(|link| LinkSnapshot {
                remote: link.remote(),
                role: link.role(),
                state: link.state(),
                data_channel_open: link.is_data_channel_open(),
                remote_stream: link.remote_stream().map(str::to_owned),
            })
            .collect();
        links.sort_by_key(|l| l.remote);

        MeshSnapshot {
            local: self.local,
            room: self.room.clone(),
            instrument: self.instrument.clone(),
            links,
            roster: self.roster.to_vec(),
            microphone: self.mic.is_some(),
        }
    }
}
