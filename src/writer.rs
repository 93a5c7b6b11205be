use crate::fetch::CameraSource;
use crate::presets::RoomPreset;
use crate::store::{SnapshotEntry, SnapshotStore};
use crate::types::CalibrationSnapshot;
use crate::{CalibError, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Field left out of the fingerprint; it changes on every run.
const VOLATILE_FIELD: &str = "generated_at_utc";

/// What [`SnapshotWriter::update`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// A new snapshot was committed.
    Written {
        entry: SnapshotEntry,
        camera_count: usize,
        client_ip: String,
    },
    /// The fetched calibration matches the newest snapshot; nothing written.
    Unchanged { latest: SnapshotEntry },
}

/// SHA-256 over the compact, key-sorted document without `generated_at_utc`.
pub fn fingerprint(snapshot: &CalibrationSnapshot) -> Result<String> {
    let mut value = snapshot.to_value()?;
    if let Some(map) = value.as_object_mut() {
        map.remove(VOLATILE_FIELD);
    }
    let serialized = serde_json::to_string(&value)?;
    Ok(hex::encode(Sha256::digest(serialized.as_bytes())))
}

/// Fetches a room's calibration and commits it when it changed.
pub struct SnapshotWriter<'a, S> {
    store: &'a SnapshotStore,
    source: S,
}

impl<'a, S: CameraSource> SnapshotWriter<'a, S> {
    pub fn new(store: &'a SnapshotStore, source: S) -> Self {
        SnapshotWriter { store, source }
    }

    /// Fetch, compare against the newest snapshot, and write if different.
    ///
    /// `no_multicast` forces unicast regardless of the preset.
    pub fn update(
        &self,
        preset: &RoomPreset,
        timeout: Duration,
        no_multicast: bool,
    ) -> Result<UpdateOutcome> {
        self.update_at(preset, timeout, no_multicast, Utc::now())
    }

    pub fn update_at(
        &self,
        preset: &RoomPreset,
        timeout: Duration,
        no_multicast: bool,
        now: DateTime<Utc>,
    ) -> Result<UpdateOutcome> {
        let conn = &preset.connection;
        let use_multicast = !no_multicast && conn.use_multicast;
        let room = preset.room();

        log::info!(
            "Fetching calibration for room '{}' from {} (client {}, multicast {})",
            room.unwrap_or("default"),
            conn.server_ip,
            conn.client_ip,
            use_multicast
        );
        let fetched = self
            .source
            .fetch(&conn.server_ip, &conn.client_ip, timeout, use_multicast)?;

        let candidate = CalibrationSnapshot::new(
            conn.server_ip.clone(),
            fetched.client_ip.clone(),
            preset.key.clone(),
            fetched.cameras,
            now,
        );

        if let Some(latest) = self.store.latest(room)? {
            if self.matches_existing(&latest, &candidate)? {
                log::info!("No changes detected; {} is current", latest.file_name);
                return Ok(UpdateOutcome::Unchanged { latest });
            }
        }

        let entry = self.store.write_at(room, &candidate, now)?;
        log::info!(
            "Saved {} cameras to {}",
            candidate.cameras.len(),
            entry.path.display()
        );
        Ok(UpdateOutcome::Written {
            entry,
            camera_count: candidate.cameras.len(),
            client_ip: fetched.client_ip,
        })
    }

    /// A previous snapshot that fails to parse counts as different, so a
    /// fresh one gets written. I/O errors still propagate.
    fn matches_existing(
        &self,
        latest: &SnapshotEntry,
        candidate: &CalibrationSnapshot,
    ) -> Result<bool> {
        let existing = match self.store.load(latest) {
            Ok(doc) => doc,
            Err(e @ CalibError::MalformedDocument { .. }) => {
                log::warn!("Ignoring malformed snapshot {}: {}", latest.file_name, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        Ok(fingerprint(&existing)? == fingerprint(candidate)?)
    }
}
