use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use ensemble_core::{MemberId, MemberInfo, RoomId, RoomStatus, SignalPayload};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::RoomConfig;
use crate::room::room::join_request;
use crate::room::{JoinOutcome, Room, RoomCommand};
use crate::signaling::SignalingOutput;

pub(crate) type RoomDirectory = Arc<DashMap<RoomId, RoomHandle>>;

#[derive(Clone)]
pub(crate) struct RoomHandle {
    pub(crate) generation: u64,
    sender: mpsc::Sender<RoomCommand>,
    occupancy: Arc<AtomicUsize>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("room '{room}' is full ({capacity} members)")]
    RoomFull { room: RoomId, capacity: usize },
}

/// Session registry: the directory of live rooms, each backed by its own `Room` task.
/// Rooms are created by the first join and unregister themselves when they empty.
#[derive(Clone)]
pub struct RoomManager {
    rooms: RoomDirectory,
    signaling: Arc<dyn SignalingOutput>,
    config: RoomConfig,
    next_generation: Arc<AtomicU64>,
}

impl RoomManager {
    pub fn new(config: RoomConfig, signaling: Arc<dyn SignalingOutput>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            signaling,
            config,
            next_generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    fn get_or_create_room(&self, room_id: &RoomId) -> RoomHandle {
        if let Some(handle) = self.rooms.get(room_id) {
            return handle.clone();
        }

        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                info!("Creating new room: {}", room_id);
                let (tx, rx) = mpsc::channel(self.config.channel_capacity);
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                let occupancy = Arc::new(AtomicUsize::new(0));

                let room = Room::new(
                    room_id.clone(),
                    self.config.capacity,
                    rx,
                    self.signaling.clone(),
                )
                .registered(self.rooms.clone(), generation, occupancy.clone());
                tokio::spawn(room.run());

                RoomHandle {
                    generation,
                    sender: tx,
                    occupancy,
                }
            })
            .clone()
    }

    fn room_sender(&self, room_id: &RoomId) -> Option<mpsc::Sender<RoomCommand>> {
        self.rooms.get(room_id).map(|handle| handle.sender.clone())
    }

    /// Admit `member_id` to `room_id`, creating the room on first use.
    /// On success returns the members that were already present.
    pub async fn join(
        &self,
        member_id: MemberId,
        room_id: &RoomId,
        nickname: &str,
    ) -> Result<Vec<MemberInfo>, JoinError> {
        loop {
            let handle = self.get_or_create_room(room_id);
            let (cmd, reply) = join_request(member_id, nickname.to_owned());

            if handle.sender.send(cmd).await.is_err() {
                debug!("Room '{}' closed under us, retrying join", room_id);
                self.forget(room_id, handle.generation);
                continue;
            }

            match reply.await {
                Ok(JoinOutcome::Accepted { existing }) => return Ok(existing),
                Ok(JoinOutcome::RoomFull) => {
                    return Err(JoinError::RoomFull {
                        room: room_id.clone(),
                        capacity: self.config.capacity,
                    });
                }
                Ok(JoinOutcome::Closed) | Err(_) => {
                    debug!("Room '{}' emptied before join was read, retrying", room_id);
                    self.forget(room_id, handle.generation);
                }
            }
        }
    }

    /// Remove `member_id` from `room_id`; returns who is still there.
    pub async fn leave(&self, member_id: MemberId, room_id: &RoomId) -> Vec<MemberId> {
        let Some(sender) = self.room_sender(room_id) else {
            debug!("Leave for unknown room '{}'", room_id);
            return Vec::new();
        };

        let (reply, rx) = oneshot::channel();
        let cmd = RoomCommand::Leave {
            member_id,
            reply: Some(reply),
        };
        if sender.send(cmd).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Forward `signal` from one member to another in the same room. Best effort.
    pub async fn relay(&self, room_id: &RoomId, from: MemberId, to: MemberId, signal: SignalPayload) {
        self.dispatch(room_id, RoomCommand::Signal { from, to, signal })
            .await;
    }

    pub async fn update_instrument(&self, room_id: &RoomId, member_id: MemberId, instrument: String) {
        let cmd = RoomCommand::UpdateInstrument {
            member_id,
            instrument,
        };
        self.dispatch(room_id, cmd).await;
    }

    pub async fn broadcast_data(&self, room_id: &RoomId, from: MemberId, message: serde_json::Value) {
        self.dispatch(room_id, RoomCommand::DataMessage { from, message })
            .await;
    }

    async fn dispatch(&self, room_id: &RoomId, cmd: RoomCommand) {
        let Some(sender) = self.room_sender(room_id) else {
            debug!("Room '{}' does not exist, dropping command", room_id);
            return;
        };
        if sender.send(cmd).await.is_err() {
            warn!("Room '{}' closed while dispatching", room_id);
        }
    }

    fn forget(&self, room_id: &RoomId, generation: u64) {
        self.rooms
            .remove_if(room_id, |_, handle| handle.generation == generation);
    }

    pub fn room_exists(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn member_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map(|handle| handle.occupancy.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Lobby snapshot of every non-empty room.
    pub fn rooms_status(&self) -> BTreeMap<RoomId, RoomStatus> {
        self.rooms
            .iter()
            .filter_map(|entry| {
                let count = entry.value().occupancy.load(Ordering::SeqCst);
                (count > 0).then(|| {
                    (
                        entry.key().clone(),
                        RoomStatus {
                            count,
                            capacity: self.config.capacity,
                        },
                    )
                })
            })
            .collect()
    }
}
