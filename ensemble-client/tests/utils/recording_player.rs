use anyhow::Result;
use async_trait::async_trait;
use ensemble_client::InstrumentPlayer;
use ensemble_core::utils::is_known_instrument;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCall {
    NoteOn {
        instrument: String,
        note: String,
        duration: Option<String>,
    },
    NoteOff {
        instrument: String,
        note: String,
    },
}

/// Player that remembers everything it was asked to do.
#[derive(Default)]
pub struct RecordingPlayer {
    calls: Mutex<Vec<PlayerCall>>,
    loaded: Mutex<Vec<String>>,
}

impl RecordingPlayer {
    pub fn calls(&self) -> Vec<PlayerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn heard(&self, instrument: &str, note: &str) -> bool {
        self.calls().iter().any(|call| {
            matches!(call, PlayerCall::NoteOn { instrument: i, note: n, .. } if i == instrument && n == note)
        })
    }
}

#[async_trait]
impl InstrumentPlayer for RecordingPlayer {
    async fn load_instrument(&self, name: &str) -> Result<()> {
        if !is_known_instrument(name) {
            anyhow::bail!("unknown instrument '{}'", name);
        }
        self.loaded.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn note_on(&self, instrument: &str, note: &str, duration: Option<&str>) {
        self.calls.lock().unwrap().push(PlayerCall::NoteOn {
            instrument: instrument.to_string(),
            note: note.to_string(),
            duration: duration.map(str::to_string),
        });
    }

    fn note_off(&self, instrument: &str, note: &str) {
        self.calls.lock().unwrap().push(PlayerCall::NoteOff {
            instrument: instrument.to_string(),
            note: note.to_string(),
        });
    }
}
