//! Fetch camera descriptions from Motive and store them as a calibration snapshot.
//!
//! Usage:
//!   update-calib --room cork
//!   update-calib --room "" --server-ip 10.40.49.47 --no-multicast

use anyhow::Context;
use clap::Parser;
use motive_calib::config::{self, Settings};
use motive_calib::{
    Connection, ConnectionOverrides, DescriptionFetcher, PresetCatalog, RoomPreset,
    SnapshotStore, SnapshotWriter, UpdateOutcome,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Fetch camera descriptions from Motive and store a calibration snapshot")]
struct Cli {
    /// Motive server IP address (overrides the room preset)
    #[arg(long)]
    server_ip: Option<String>,

    /// Client IP, or "auto" to detect (overrides the room preset)
    #[arg(long)]
    client_ip: Option<String>,

    /// Seconds to wait for data descriptions
    #[arg(long)]
    timeout: Option<f64>,

    /// Use unicast instead of multicast
    #[arg(long)]
    no_multicast: bool,

    /// Room preset name; pass "" for the default room
    #[arg(long)]
    room: Option<String>,

    /// Directory holding calibration snapshots
    #[arg(long)]
    calib_root: Option<PathBuf>,

    /// Directory holding room presets
    #[arg(long)]
    presets_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env();
    let room_name = cli.room.clone().unwrap_or(settings.room.clone());
    let timeout = cli
        .timeout
        .map(config::timeout_from_secs)
        .unwrap_or(settings.timeout);

    let preset = if room_name.is_empty() {
        RoomPreset::unnamed(Connection {
            server_ip: cli.server_ip.clone().unwrap_or(settings.server_ip.clone()),
            client_ip: cli.client_ip.clone().unwrap_or_else(|| "auto".to_string()),
            use_multicast: settings.use_multicast,
        })
    } else {
        let catalog = match &cli.presets_dir {
            Some(dir) => PresetCatalog::new(dir),
            None => PresetCatalog::locate()?,
        };
        let overrides = ConnectionOverrides {
            server_ip: cli.server_ip.clone(),
            client_ip: cli.client_ip.clone(),
            use_multicast: None,
        };
        catalog
            .load_room(&room_name, Some(&overrides))
            .with_context(|| format!("loading room preset '{}'", room_name))?
    };

    let use_multicast = !cli.no_multicast && preset.connection.use_multicast;
    println!("Calib Fetch");
    println!("{}", "=".repeat(40));
    println!("Room      : {}", preset.room().unwrap_or("default"));
    println!("Server IP : {}", preset.connection.server_ip);
    println!("Client IP : {}", preset.connection.client_ip);
    println!("Multicast : {}", use_multicast);

    let store = SnapshotStore::new(cli.calib_root.unwrap_or(settings.calib_root));
    let writer = SnapshotWriter::new(&store, DescriptionFetcher::natnet());
    let outcome = writer
        .update(&preset, timeout, cli.no_multicast)
        .context("updating calibration")?;

    match outcome {
        UpdateOutcome::Written {
            entry,
            camera_count,
            client_ip,
        } => {
            println!("Resolved Client IP : {}", client_ip);
            println!("Saved {} cameras", camera_count);
            println!("Snapshot : {}", entry.path.display());
        }
        UpdateOutcome::Unchanged { latest } => {
            println!("No changes detected; latest calibration is identical.");
            println!("Latest   : {}", latest.path.display());
        }
    }
    Ok(())
}
