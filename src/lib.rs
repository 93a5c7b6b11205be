//! # motive_calib - OptiTrack Motive camera calibration snapshots
//!
//! Pulls the camera rig description (per-camera name, serial, position,
//! orientation) from a Motive server over NatNet and keeps it as immutable,
//! timestamped JSON snapshots per room. Provides:
//! - A bounded model-definition fetch with guaranteed client cleanup
//! - A snapshot store with newest / listing / at-or-before lookups
//! - Change detection so identical calibrations aren't written twice
//!
//! ## Quick Start
//! ```no_run
//! use motive_calib::{DescriptionFetcher, PresetCatalog, SnapshotStore, SnapshotWriter};
//! use std::time::Duration;
//!
//! let presets = PresetCatalog::locate().unwrap();
//! let room = presets.load_room("cork", None).unwrap();
//!
//! let store = SnapshotStore::new("calib");
//! let writer = SnapshotWriter::new(&store, DescriptionFetcher::natnet());
//! let outcome = writer.update(&room, Duration::from_secs(8), false).unwrap();
//! println!("{:?}", outcome);
//!
//! if let Some(entry) = store.find_at_or_before(Some("cork"), "2026-02-05").unwrap() {
//!     println!("calibration in effect: {}", entry.file_name);
//! }
//! ```

pub mod error;
pub mod types;
pub mod timestamp;
pub mod store;
pub mod protocol;
pub mod natnet;
pub mod fetch;
pub mod presets;
pub mod writer;
pub mod config;

pub use error::CalibError;
pub use types::*;
pub use store::{SnapshotEntry, SnapshotStore};
pub use fetch::{
    resolve_client_ip, CameraSource, DescriptionFetcher, FetchedCameras, StreamingClient,
};
pub use natnet::NatNetClient;
pub use presets::{Connection, ConnectionOverrides, PresetCatalog, RoomPreset};
pub use writer::{fingerprint, SnapshotWriter, UpdateOutcome};

/// Result type alias for motive_calib operations.
pub type Result<T> = std::result::Result<T, CalibError>;
