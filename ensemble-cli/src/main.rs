mod player;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Input, Select};
use ensemble_client::{
    Collaborators, MeshConfig, MeshCoordinator, MeshHandle, RtcTransportFactory, SilentMicrophone,
    WsSignaling,
};
use ensemble_core::utils::{AVAILABLE_INSTRUMENTS, DEFAULT_INSTRUMENT};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::player::ConsolePlayer;

#[derive(Parser)]
#[command(name = "ensemble", about = "Headless participant for ensemble jam rooms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a room and play notes typed on stdin.
    Join {
        #[arg(long, env = "ENSEMBLE_RELAY", default_value = "ws://127.0.0.1:3000/ws")]
        relay: String,

        #[arg(short, long)]
        room: Option<String>,

        #[arg(short, long)]
        nickname: Option<String>,

        #[arg(short, long)]
        instrument: Option<String>,

        /// Host candidates only.
        #[arg(long)]
        no_stun: bool,

        /// Seconds before a stuck negotiation is abandoned.
        #[arg(long, default_value_t = 30)]
        negotiation_timeout: u64,
    },

    /// List the instruments peers can load.
    Instruments,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    match Cli::parse().command {
        Commands::Instruments => {
            for name in AVAILABLE_INSTRUMENTS {
                let marker = if name == DEFAULT_INSTRUMENT { "*" } else { " " };
                println!("{} {}", marker.green(), name);
            }
        }

        Commands::Join {
            relay,
            room,
            nickname,
            instrument,
            no_stun,
            negotiation_timeout,
        } => {
            let room = match room {
                Some(room) => room,
                None => Input::<String>::new()
                    .with_prompt("Room")
                    .interact_text()?,
            };
            let nickname = match nickname {
                Some(nickname) => nickname,
                None => Input::<String>::new()
                    .with_prompt("Nickname")
                    .interact_text()?,
            };
            let instrument = match instrument {
                Some(instrument) => instrument,
                None => pick_instrument()?,
            };

            let mut config = if no_stun {
                MeshConfig::local_only()
            } else {
                MeshConfig::default()
            };
            config.negotiation_timeout = Duration::from_secs(negotiation_timeout);

            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(session(relay, room, nickname, instrument, config))?;
        }
    }

    Ok(())
}

fn pick_instrument() -> Result<String> {
    let default = AVAILABLE_INSTRUMENTS
        .iter()
        .position(|name| *name == DEFAULT_INSTRUMENT)
        .unwrap_or(0);
    let choice = Select::new()
        .with_prompt("Instrument")
        .items(&AVAILABLE_INSTRUMENTS)
        .default(default)
        .interact()?;
    Ok(AVAILABLE_INSTRUMENTS[choice].to_owned())
}

async fn session(
    relay: String,
    room: String,
    nickname: String,
    instrument: String,
    config: MeshConfig,
) -> Result<()> {
    println!("{}", format!("🔌 Connecting to {}...", relay).cyan());
    let (signals, inbound) = WsSignaling::connect(&relay).await?;

    let collaborators = Collaborators {
        player: Arc::new(ConsolePlayer),
        microphone: Arc::new(SilentMicrophone::new(format!("{}-mic", nickname))),
    };
    let factory = Arc::new(RtcTransportFactory::new(config.clone()));
    let (coordinator, mesh) =
        MeshCoordinator::new(config, Arc::new(signals), inbound, factory, collaborators);
    let task = tokio::spawn(coordinator.run());

    mesh.set_instrument(&instrument)
        .await
        .with_context(|| format!("Cannot play '{}'", instrument))?;
    let id = mesh.join(room.as_str(), &nickname).await?;
    println!(
        "{} joined '{}' as {} ({})",
        "✨".green(),
        room.bold(),
        nickname.bold(),
        id.to_string().dimmed()
    );
    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let arg = words.next();

        let outcome = match (command, arg) {
            ("note" | "n", Some(note)) => mesh.note_on(note).await,
            ("off", Some(note)) => mesh.note_off(note).await,
            ("inst", Some(name)) => mesh.set_instrument(name).await,
            ("mic", Some(state)) => mesh.set_microphone(state == "on").await.map(|enabled| {
                println!("🎙  microphone {}", if enabled { "on" } else { "off" });
            }),
            ("who", _) => print_roster(&mesh).await,
            ("quit" | "q", _) => break,
            _ => {
                print_help();
                Ok(())
            }
        };

        if let Err(e) = outcome {
            eprintln!("{} {}", "✗".red(), e);
        }
    }

    mesh.leave().await?;
    task.await?;
    println!("{}", "👋 Left the room".green());
    Ok(())
}

async fn print_roster(mesh: &MeshHandle) -> Result<(), ensemble_client::MeshError> {
    let snapshot = mesh.snapshot().await?;
    println!(
        "{} playing {}",
        "you".bold(),
        snapshot.instrument.cyan()
    );
    for member in &snapshot.roster {
        let link = snapshot
            .link(&member.id)
            .map(|l| format!("{:?}", l.state).to_lowercase())
            .unwrap_or_else(|| "absent".to_owned());
        println!(
            "   {} playing {} [{}]",
            member.nickname.bold(),
            member.instrument.cyan(),
            link.dimmed()
        );
    }
    Ok(())
}

fn print_help() {
    println!(
        "{}",
        "commands: note <C4> | off <C4> | inst <name> | mic on|off | who | quit".dimmed()
    );
}
