use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::utils::DEFAULT_INSTRUMENT;

/// Server-assigned identity of one connected participant.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for MemberId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Roster entry as it travels in `join-success` and `user-joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub id: MemberId,
    pub nickname: String,
    #[serde(default = "default_instrument")]
    pub instrument: String,
}

impl MemberInfo {
    pub fn new(id: MemberId, nickname: impl Into<String>) -> Self {
        Self {
            id,
            nickname: nickname.into(),
            instrument: DEFAULT_INSTRUMENT.to_owned(),
        }
    }
}

fn default_instrument() -> String {
    DEFAULT_INSTRUMENT.to_owned()
}
