use clap::Parser;
use ensemble_core::utils::MAX_MEMBERS_PER_ROOM;
use std::net::SocketAddr;

/// Relay server settings.
#[derive(Debug, Clone, Parser)]
#[command(name = "ensemble-server", about = "Room registry and signaling relay")]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to.
    #[arg(long, env = "ENSEMBLE_BIND", default_value = "0.0.0.0:3000")]
    pub bind: SocketAddr,

    #[command(flatten)]
    pub rooms: RoomConfig,
}

#[derive(Debug, Clone, Copy, clap::Args)]
pub struct RoomConfig {
    /// Maximum members per room.
    #[arg(long = "room-capacity", env = "ENSEMBLE_ROOM_CAPACITY", default_value_t = MAX_MEMBERS_PER_ROOM)]
    pub capacity: usize,

    /// Depth of each room's command queue.
    #[arg(long = "room-queue", env = "ENSEMBLE_ROOM_QUEUE", default_value_t = 100)]
    pub channel_capacity: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            capacity: MAX_MEMBERS_PER_ROOM,
            channel_capacity: 100,
        }
    }
}

impl RoomConfig {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }
}
