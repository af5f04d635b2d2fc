mod link_event;
mod peer_transport;
mod rtc_transport;

pub use link_event::*;
pub use peer_transport::*;
pub use rtc_transport::*;
