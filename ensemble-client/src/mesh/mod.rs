mod coordinator;
mod mesh_handle;
mod peer_link;
mod roster;

pub use coordinator::*;
pub use mesh_handle::*;
pub use peer_link::*;
pub use roster::*;
