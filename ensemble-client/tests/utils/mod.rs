pub mod loopback;
pub mod recording_player;

pub use loopback::*;
pub use recording_player::*;
pub use relay::*;
