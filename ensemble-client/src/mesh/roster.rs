use ensemble_core::{MemberId, MemberInfo};
use std::collections::HashMap;

/// Locally cached view of the other members in the room.
#[derive(Debug, Default, Clone)]
pub struct Roster {
    members: HashMap<MemberId, MemberInfo>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&mut self, users: impl IntoIterator<Item = MemberInfo>) {
        self.members.clear();
        for user in users {
            self.members.insert(user.id, user);
        }
    }

    pub fn insert(&mut self, info: MemberInfo) {
        self.members.insert(info.id, info);
    }

    pub fn remove(&mut self, id: &MemberId) -> Option<MemberInfo> {
        self.members.remove(id)
    }

    /// Returns false when `id` is unknown.
    pub fn set_instrument(&mut self, id: &MemberId, instrument: &str) -> bool {
        match self.members.get_mut(id) {
            Some(info) => {
                info.instrument = instrument.to_owned();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &MemberId) -> Option<&MemberInfo> {
        self.members.get(id)
    }

    pub fn contains(&self, id: &MemberId) -> bool {
        self.members.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    /// Members sorted by nickname, then id.
    pub fn to_vec(&self) -> Vec<MemberInfo> {
        let mut members: Vec<MemberInfo> = self.members.values().cloned().collect();
        members.sort_by(|a, b| a.nickname.cmp(&b.nickname).then(a.id.cmp(&b.id)));
        members
    }
}
