use anyhow::Result;
use async_trait::async_trait;
use colored::*;
use ensemble_client::InstrumentPlayer;
use ensemble_core::utils::is_known_instrument;

/// Prints what peers play instead of producing sound.
pub struct ConsolePlayer;

#[async_trait]
impl InstrumentPlayer for ConsolePlayer {
    async fn load_instrument(&self, name: &str) -> Result<()> {
        if !is_known_instrument(name) {
            anyhow::bail!("no samples for '{}'", name);
        }
        Ok(())
    }

    fn note_on(&self, instrument: &str, note: &str, duration: Option<&str>) {
        println!(
            "   🎵 {} {} {}",
            instrument.cyan(),
            note.bold(),
            duration.unwrap_or("").dimmed()
        );
    }

    fn note_off(&self, instrument: &str, note: &str) {
        println!("   🔇 {} {}", instrument.cyan(), note.dimmed());
    }
}
