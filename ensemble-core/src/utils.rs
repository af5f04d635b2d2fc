pub const MAX_MEMBERS_PER_ROOM: usize = 5;

pub const DEFAULT_INSTRUMENT: &str = "piano";

pub const DEFAULT_NOTE_DURATION: &str = "8n";

pub const DEFAULT_STUN_ADDR: &str = "stun:stun.l.google.com:19302";

/// Sample instruments the players are expected to be able to load.
pub const AVAILABLE_INSTRUMENTS: [&str; 20] = [
    "bass-electric",
    "bassoon",
    "cello",
    "clarinet",
    "contrabass",
    "flute",
    "french-horn",
    "guitar-acoustic",
    "guitar-electric",
    "guitar-nylon",
    "harmonium",
    "harp",
    "organ",
    "piano",
    "saxophone",
    "trombone",
    "trumpet",
    "tuba",
    "violin",
    "xylophone",
];

pub fn is_known_instrument(name: &str) -> bool {
    AVAILABLE_INSTRUMENTS.contains(&name)
}
