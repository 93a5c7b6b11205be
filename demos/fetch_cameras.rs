//! Fetch the camera list from Motive once and print it without storing anything.
//!
//! Usage: cargo run --example fetch_cameras -- [server-ip] [client-ip]

use motive_calib::config::Settings;
use motive_calib::DescriptionFetcher;

fn main() {
    env_logger::init();

    let settings = Settings::from_env();
    let mut args = std::env::args().skip(1);
    let server_ip = args.next().unwrap_or(settings.server_ip);
    let client_ip = args.next().unwrap_or_else(|| "auto".to_string());

    let fetcher = DescriptionFetcher::natnet();
    let fetched = match fetcher.fetch(&server_ip, &client_ip, settings.timeout, settings.use_multicast)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    eprintln!("Server:    {}", server_ip);
    eprintln!("Client IP: {}", fetched.client_ip);
    eprintln!("Cameras:   {}", fetched.cameras.len());

    for cam in &fetched.cameras {
        println!(
            "{:<24} serial={:<8} pos=[{:.4}, {:.4}, {:.4}] quat=[{:.4}, {:.4}, {:.4}, {:.4}]",
            cam.name,
            cam.serial.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            cam.position[0],
            cam.position[1],
            cam.position[2],
            cam.orientation[0],
            cam.orientation[1],
            cam.orientation[2],
            cam.orientation[3],
        );
    }
}
