mod member;
mod room;
mod room_command;
mod room_manager;

pub use member::*;
pub use room::*;
pub use room_command::*;
pub use room_manager::*;
