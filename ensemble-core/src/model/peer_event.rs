use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};

/// Events exchanged directly between peers over the data channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PeerEvent {
    NoteOn {
        instrument: String,
        note: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<String>,
    },
    NoteOff {
        instrument: String,
        note: String,
    },
    InstrumentChange {
        instrument: String,
    },
}

impl PeerEvent {
    pub fn instrument(&self) -> &str {
        match self {
            PeerEvent::NoteOn { instrument, .. }
            | PeerEvent::NoteOff { instrument, .. }
            | PeerEvent::InstrumentChange { instrument } => instrument,
        }
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_value(value)?)
    }
}
