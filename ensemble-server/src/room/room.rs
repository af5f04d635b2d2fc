use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ensemble_core::{MemberId, MemberInfo, RoomId, ServerMessage, SignalPayload};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::room::member::Member;
use crate::room::room_command::{JoinOutcome, RoomCommand};
use crate::room::room_manager::RoomDirectory;
use crate::signaling::SignalingOutput;

/// Room actor. Owns the member set of one room; every mutation of that set
/// happens inside `run`, so rooms never contend with each other.
pub struct Room {
    id: RoomId,
    capacity: usize,
    members: HashMap<MemberId, Member>,
    command_rx: mpsc::Receiver<RoomCommand>,
    signaling: Arc<dyn SignalingOutput>,
    occupancy: Arc<AtomicUsize>,
    directory: Option<(RoomDirectory, u64)>,
}

impl Room {
    pub fn new(
        id: RoomId,
        capacity: usize,
        command_rx: mpsc::Receiver<RoomCommand>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            id,
            capacity,
            members: HashMap::new(),
            command_rx,
            signaling,
            occupancy: Arc::new(AtomicUsize::new(0)),
            directory: None,
        }
    }

    /// Attach the room to the registry directory so it can unregister itself once empty.
    pub(crate) fn registered(
        mut self,
        directory: RoomDirectory,
        generation: u64,
        occupancy: Arc<AtomicUsize>,
    ) -> Self {
        self.directory = Some((directory, generation));
        self.occupancy = occupancy;
        self
    }

    /// Event loop. Returns once the last member has left.
    pub async fn run(mut self) {
        info!("Room '{}' event loop started", self.id);

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.members.is_empty() {
                self.shutdown().await;
                break;
            }
        }

        info!("Room '{}' event loop finished", self.id);
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                member_id,
                nickname,
                reply,
            } => {
                let outcome = self.join(member_id, nickname).await;
                let _ = reply.send(outcome);
            }

            RoomCommand::Leave { member_id, reply } => {
                let remaining = self.leave(&member_id).await;
                if let Some(reply) = reply {
                    let _ = reply.send(remaining);
                }
            }

            RoomCommand::Signal { from, to, signal } => self.relay(from, to, signal).await,

            RoomCommand::UpdateInstrument {
                member_id,
                instrument,
            } => {
                let Some(member) = self.members.get_mut(&member_id) else {
                    debug!("Instrument update from non-member {} ignored", member_id);
                    return;
                };
                info!("{} switched to '{}'", member_id, instrument);
                member.instrument = instrument.clone();

                let msg = ServerMessage::UserInstrumentUpdated {
                    id: member_id,
                    instrument,
                };
                self.broadcast(Some(member_id), msg).await;
            }

            RoomCommand::DataMessage { from, message } => {
                if !self.members.contains_key(&from) {
                    debug!("Data message from non-member {} ignored", from);
                    return;
                }
                let msg = ServerMessage::DataChannelMessage { from, message };
                self.broadcast(Some(from), msg).await;
            }
        }
    }

    async fn join(&mut self, member_id: MemberId, nickname: String) -> JoinOutcome {
        if self.members.len() >= self.capacity {
            info!(
                "Room '{}' is full ({}/{}), refusing {}",
                self.id,
                self.members.len(),
                self.capacity,
                member_id
            );
            self.signaling
                .deliver(&member_id, ServerMessage::RoomFull {})
                .await;
            return JoinOutcome::RoomFull;
        }

        let existing: Vec<MemberInfo> = self.members.values().map(Member::info).collect();
        let member = Member::new(member_id, nickname);
        let announced = member.info();

        self.members.insert(member_id, member);
        self.occupancy.store(self.members.len(), Ordering::SeqCst);
        info!(
            "{} ('{}') joined room '{}' ({}/{})",
            member_id,
            announced.nickname,
            self.id,
            self.members.len(),
            self.capacity
        );

        self.signaling
            .deliver(
                &member_id,
                ServerMessage::JoinSuccess {
                    id: member_id,
                    users: existing.clone(),
                },
            )
            .await;
        self.broadcast(Some(member_id), ServerMessage::UserJoined(announced))
            .await;

        JoinOutcome::Accepted { existing }
    }

    async fn leave(&mut self, member_id: &MemberId) -> Vec<MemberId> {
        if self.members.remove(member_id).is_some() {
            self.occupancy.store(self.members.len(), Ordering::SeqCst);
            info!("{} left room '{}'", member_id, self.id);

            if self.members.is_empty() {
                self.unregister();
            }

            self.broadcast(None, ServerMessage::UserLeft { id: *member_id })
                .await;
        } else {
            debug!("{} is not a member of room '{}'", member_id, self.id);
        }

        self.members.keys().copied().collect()
    }

    async fn relay(&self, from: MemberId, to: MemberId, signal: SignalPayload) {
        let Some(sender) = self.members.get(&from) else {
            debug!("Signal from non-member {} dropped", from);
            return;
        };
        if !self.members.contains_key(&to) {
            debug!(
                "Dropping {} from {}: target {} not in room '{}'",
                signal.kind(),
                from,
                to,
                self.id
            );
            return;
        }

        debug!("Relaying {} {} -> {}", signal.kind(), from, to);
        let msg = ServerMessage::Signal {
            from,
            from_nickname: sender.nickname.clone(),
            signal,
        };
        self.signaling.deliver(&to, msg).await;
    }

    async fn broadcast(&self, except: Option<MemberId>, msg: ServerMessage) {
        let targets: Vec<MemberId> = self
            .members
            .keys()
            .filter(|id| Some(**id) != except)
            .copied()
            .collect();

        for target in targets {
            self.signaling.deliver(&target, msg.clone()).await;
        }
    }

    /// Drop this room from the registry directory; later joins create a fresh room.
    fn unregister(&self) {
        if let Some((directory, generation)) = &self.directory {
            directory.remove_if(&self.id, |_, handle| handle.generation == *generation);
        }
    }

    /// Unregister, then answer whatever is still queued so callers can retry elsewhere.
    async fn shutdown(&mut self) {
        self.unregister();
        self.command_rx.close();

        while let Some(cmd) = self.command_rx.recv().await {
            match cmd {
                RoomCommand::Join { reply, .. } => {
                    let _ = reply.send(JoinOutcome::Closed);
                }
                RoomCommand::Leave {
                    reply: Some(reply), ..
                } => {
                    let _ = reply.send(Vec::new());
                }
                other => warn!("Room '{}' closed, dropping {:?}", self.id, other),
            }
        }

        info!("Room '{}' deleted", self.id);
    }
}

/// Convenience for callers that only need the reply half of a join.
pub(crate) fn join_request(
    member_id: MemberId,
    nickname: String,
) -> (RoomCommand, oneshot::Receiver<JoinOutcome>) {
    let (reply, rx) = oneshot::channel();
    (
        RoomCommand::Join {
            member_id,
            nickname,
            reply,
        },
        rx,
    )
}
