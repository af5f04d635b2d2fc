use ensemble_core::utils::DEFAULT_INSTRUMENT;
use ensemble_core::{MemberId, MemberInfo};

/// Registry-side record of one room member.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: MemberId,
    pub nickname: String,
    pub instrument: String,
}

impl Member {
    pub fn new(id: MemberId, nickname: String) -> Self {
        Self {
            id,
            nickname,
            instrument: DEFAULT_INSTRUMENT.to_owned(),
        }
    }

    pub fn info(&self) -> MemberInfo {
        MemberInfo {
            id: self.id,
            nickname: self.nickname.clone(),
            instrument: self.instrument.clone(),
        }
    }
}
