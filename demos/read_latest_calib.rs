//! Load the latest calibration snapshot for a room and print every camera.
//!
//! Usage: cargo run --example read_latest_calib -- [room] [target-date]

use motive_calib::config::Settings;
use motive_calib::SnapshotStore;

fn main() {
    env_logger::init();

    let settings = Settings::from_env();
    let mut args = std::env::args().skip(1);
    let room = args.next().unwrap_or(settings.room);
    let target = args.next().unwrap_or_else(|| "2026-02-05".to_string());
    let room_key = if room.is_empty() { None } else { Some(room.as_str()) };

    let store = SnapshotStore::new(settings.calib_root);
    let names = match store.list_names(room_key) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("Failed to list snapshots: {}", e);
            std::process::exit(1);
        }
    };
    let Some(latest_name) = names.last() else {
        println!("No calibration snapshots found for room '{}'.", room);
        return;
    };

    let data = match store.load_latest(room_key) {
        Ok(Some(d)) => d,
        Ok(None) => {
            println!("No calibration found for room '{}'.", room);
            return;
        }
        Err(e) => {
            eprintln!("Failed to load calibration: {}", e);
            std::process::exit(1);
        }
    };

    println!("Room        : {}", if data.room.is_empty() { &room } else { &data.room });
    println!("Generated   : {}", data.generated_at_utc);
    println!("Server IP   : {}", data.server_ip);
    println!("Camera count: {}", data.cameras.len());
    println!("Latest file : {}", latest_name);
    println!();

    // With snapshots on Monday, Tuesday and Friday, a Thursday target picks Tuesday.
    match store.find_at_or_before(room_key, target.as_str()) {
        Ok(Some(entry)) => println!("Closest calib at/before {}: {}", target, entry.file_name),
        Ok(None) => println!("No calibration found at or before {}.", target),
        Err(e) => eprintln!("{}", e),
    }
    println!();

    for cam in &data.cameras {
        println!("Camera: {}", cam.name);
        match cam.serial {
            Some(serial) => println!("  Serial      : {}", serial),
            None => println!("  Serial      : -"),
        }
        println!("  Position    : {:?}", cam.position);
        println!("  Orientation : {:?}", cam.orientation);
        if !cam.extra.is_empty() {
            println!("  Extras      : {:?}", cam.extra);
        }
        println!();
    }
}
