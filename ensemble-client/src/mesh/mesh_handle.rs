use crate::error::MeshError;
use crate::mesh::peer_link::LinkState;
use crate::transport::Role;
use ensemble_core::utils::DEFAULT_NOTE_DURATION;
use ensemble_core::{MemberId, MemberInfo, RoomId};
use tokio::sync::{mpsc, oneshot};

/// Requests from the application to its coordinator.
#[derive(Debug)]
pub enum MeshCommand {
    Join {
        room_id: RoomId,
        nickname: String,
        reply: oneshot::Sender<Result<MemberId, MeshError>>,
    },
    NoteOn {
        note: String,
        duration: Option<String>,
    },
    NoteOff {
        note: String,
    },
    SetInstrument {
        instrument: String,
        reply: oneshot::Sender<Result<(), MeshError>>,
    },
    SetMicrophone {
        enabled: bool,
        reply: oneshot::Sender<Result<bool, MeshError>>,
    },
    Snapshot {
        reply: oneshot::Sender<MeshSnapshot>,
    },
    /// Tear everything down and stop the coordinator.
    Leave {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkSnapshot {
    pub remote: MemberId,
    pub role: Role,
    pub state: LinkState,
    pub data_channel_open: bool,
    pub remote_stream: Option<String>,
}

/// Point-in-time view of one participant's mesh.
#[derive(Debug, Clone, Default)]
pub struct MeshSnapshot {
    pub local: Option<MemberId>,
    pub room: Option<RoomId>,
    pub instrument: String,
    pub links: Vec<LinkSnapshot>,
    pub roster: Vec<MemberInfo>,
    pub microphone: bool,
}

impl MeshSnapshot {
    pub fn link(&self, remote: &MemberId) -> Option<&LinkSnapshot> {
        self.links.iter().find(|l| &l.remote == remote)
    }

    pub fn connected(&self) -> usize {
        self.links
            .iter()
            .filter(|l| l.state == LinkState::Connected)
            .count()
    }

    /// Ids of the inbound media streams currently delivered.
    pub fn remote_streams(&self) -> Vec<String> {
        self.links
            .iter()
            .filter_map(|l| l.remote_stream.clone())
            .collect()
    }
}

/// Cloneable front door to a running `MeshCoordinator`.
#[derive(Clone)]
pub struct MeshHandle {
    commands: mpsc::Sender<MeshCommand>,
}

impl MeshHandle {
    pub(crate) fn new(commands: mpsc::Sender<MeshCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> MeshCommand,
    ) -> Result<T, MeshError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| MeshError::Stopped)?;
        rx.await.map_err(|_| MeshError::Stopped)
    }

    /// Join `room_id`; resolves once the relay accepts or refuses.
    pub async fn join(&self, room_id: impl Into<RoomId>, nickname: &str) -> Result<MemberId, MeshError> {
        let room_id = room_id.into();
        let nickname = nickname.to_owned();
        self.request(|reply| MeshCommand::Join {
            room_id,
            nickname,
            reply,
        })
        .await?
    }

    /// Play `note` on every open link with the local instrument.
    pub async fn note_on(&self, note: &str) -> Result<(), MeshError> {
        self.send(MeshCommand::NoteOn {
            note: note.to_owned(),
            duration: Some(DEFAULT_NOTE_DURATION.to_owned()),
        })
        .await
    }

    pub async fn note_off(&self, note: &str) -> Result<(), MeshError> {
        self.send(MeshCommand::NoteOff {
            note: note.to_owned(),
        })
        .await
    }

    pub async fn set_instrument(&self, instrument: &str) -> Result<(), MeshError> {
        let instrument = instrument.to_owned();
        self.request(|reply| MeshCommand::SetInstrument { instrument, reply })
            .await?
    }

    /// Returns whether the microphone ended up enabled.
    pub async fn set_microphone(&self, enabled: bool) -> Result<bool, MeshError> {
        self.request(|reply| MeshCommand::SetMicrophone { enabled, reply })
            .await?
    }

    pub async fn snapshot(&self) -> Result<MeshSnapshot, MeshError> {
        self.request(|reply| MeshCommand::Snapshot { reply }).await
    }

    pub async fn remote_streams(&self) -> Result<Vec<String>, MeshError> {
        Ok(self.snapshot().await?.remote_streams())
    }

    pub async fn leave(&self) -> Result<(), MeshError> {
        self.request(|reply| MeshCommand::Leave { reply }).await
    }

    async fn send(&self, cmd: MeshCommand) -> Result<(), MeshError> {
        self.commands.send(cmd).await.map_err(|_| MeshError::Stopped)
    }
}
