use crate::timestamp::{self, Target, SNAPSHOT_SUFFIX};
use crate::types::CalibrationSnapshot;
use crate::{CalibError, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Filenames containing this marker belong to the legacy pointer layout and
/// are never listed as snapshots.
const RESERVED_MARKER: &str = "latest";

/// A snapshot file located by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub path: PathBuf,
    pub file_name: String,
    /// Instant decoded from the filename token. `None` for legacy pointer files.
    pub timestamp: Option<NaiveDateTime>,
}

impl SnapshotEntry {
    fn new(path: PathBuf, timestamp: Option<NaiveDateTime>) -> Self {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        SnapshotEntry {
            path,
            file_name,
            timestamp,
        }
    }
}

/// One way of answering "which file is the latest calibration".
type LatestResolver = fn(&SnapshotStore, Option<&str>) -> Result<Option<SnapshotEntry>>;

/// Tried in order by [`SnapshotStore::latest`]. The last two keep data
/// directories from the single-pointer layout readable.
const LATEST_RESOLVERS: [LatestResolver; 3] = [
    newest_snapshot,
    legacy_latest_directory,
    legacy_latest_file,
];

/// Append-only, timestamp-keyed calibration snapshots under one root directory.
///
/// Files are named `<room>_<YYMMDD_HHMM>.json` (`calib_<token>.json` for the
/// default room). Nothing here locks the directory; callers serialize writers.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Snapshots for `room`, oldest first. A missing root yields an empty list.
    pub fn list(&self, room: Option<&str>) -> Result<Vec<SnapshotEntry>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CalibError::storage(&self.root, e)),
        };

        let prefix = timestamp::room_prefix(room);
        let mut entries = Vec::new();
        for dir_entry in read_dir {
            let dir_entry = dir_entry.map_err(|e| CalibError::storage(&self.root, e))?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(prefix.as_str())
                || !name.ends_with(SNAPSHOT_SUFFIX)
                || name.contains(RESERVED_MARKER)
            {
                continue;
            }
            let path = dir_entry.path();
            // Follows symlinks, so a linked snapshot still counts.
            if !path.is_file() {
                continue;
            }
            let ts = timestamp::decode(&name, room);
            entries.push(SnapshotEntry::new(path, ts));
        }

        entries.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(entries)
    }

    /// Filenames of [`list`](Self::list), oldest first.
    pub fn list_names(&self, room: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .list(room)?
            .into_iter()
            .map(|e| e.file_name)
            .collect())
    }

    /// The newest snapshot, falling back to the legacy pointer locations.
    pub fn latest(&self, room: Option<&str>) -> Result<Option<SnapshotEntry>> {
        for resolve in LATEST_RESOLVERS {
            if let Some(entry) = resolve(self, room)? {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    /// Parse the document found by [`latest`](Self::latest).
    pub fn load_latest(&self, room: Option<&str>) -> Result<Option<CalibrationSnapshot>> {
        match self.latest(room)? {
            Some(entry) => self.load(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Read and parse one snapshot file.
    pub fn load(&self, entry: &SnapshotEntry) -> Result<CalibrationSnapshot> {
        let text =
            fs::read_to_string(&entry.path).map_err(|e| CalibError::storage(&entry.path, e))?;
        serde_json::from_str(&text).map_err(|e| CalibError::malformed(&entry.path, e))
    }

    /// The newest snapshot whose token is at or before `target`.
    ///
    /// Text targets accept `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`, or `YYMMDD_HHMM`;
    /// anything else is [`CalibError::InvalidFormat`]. Files whose names
    /// don't decode are ignored.
    pub fn find_at_or_before(
        &self,
        room: Option<&str>,
        target: impl Into<Target>,
    ) -> Result<Option<SnapshotEntry>> {
        let target = target.into().resolve()?;
        let found = self
            .list(room)?
            .into_iter()
            .filter(|e| matches!(e.timestamp, Some(ts) if ts <= target))
            .max_by_key(|e| e.timestamp);
        Ok(found)
    }

    /// Write `snapshot` under a token for the current minute.
    pub fn write(
        &self,
        room: Option<&str>,
        snapshot: &CalibrationSnapshot,
    ) -> Result<SnapshotEntry> {
        self.write_at(room, snapshot, Utc::now())
    }

    /// Write `snapshot` under the token for `instant`, creating the root if needed.
    ///
    /// A second write for the same room within the same minute replaces the
    /// first file.
    pub fn write_at(
        &self,
        room: Option<&str>,
        snapshot: &CalibrationSnapshot,
        instant: DateTime<Utc>,
    ) -> Result<SnapshotEntry> {
        fs::create_dir_all(&self.root).map_err(|e| CalibError::storage(&self.root, e))?;

        let file_name = timestamp::snapshot_file_name(room, instant);
        let path = self.root.join(&file_name);
        if path.exists() {
            log::warn!("Replacing snapshot written in the same minute: {}", path.display());
        }
        let body = snapshot.to_pretty_json()?;
        fs::write(&path, body).map_err(|e| CalibError::storage(&path, e))?;

        log::debug!("Wrote snapshot {}", path.display());
        let ts = timestamp::decode(&file_name, room);
        Ok(SnapshotEntry::new(path, ts))
    }
}

fn newest_snapshot(store: &SnapshotStore, room: Option<&str>) -> Result<Option<SnapshotEntry>> {
    Ok(store.list(room)?.pop())
}

/// `<root>/latest/<room>_calib.json` or `<root>/latest/calib.json`.
fn legacy_latest_directory(
    store: &SnapshotStore,
    room: Option<&str>,
) -> Result<Option<SnapshotEntry>> {
    let name = match room {
        Some(r) if !r.is_empty() => format!("{}_calib.json", r),
        _ => "calib.json".to_string(),
    };
    Ok(existing(store.root.join("latest").join(name)))
}

/// `<root>/<room>_latest.json` or `<root>/calib_latest.json`.
fn legacy_latest_file(store: &SnapshotStore, room: Option<&str>) -> Result<Option<SnapshotEntry>> {
    let name = match room {
        Some(r) if !r.is_empty() => format!("{}_latest.json", r),
        _ => "calib_latest.json".to_string(),
    };
    Ok(existing(store.root.join(name)))
}

fn existing(path: PathBuf) -> Option<SnapshotEntry> {
    if path.exists() {
        Some(SnapshotEntry::new(path, None))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CameraDescription;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeMap;

    fn snapshot(room: &str, x: f64) -> CalibrationSnapshot {
        let cam = CameraDescription {
            name: "Prime 41 #100".into(),
            serial: Some(100),
            position: [x, 1.0, 2.0],
            orientation: [0.0, 0.0, 0.0, 1.0],
            extra: BTreeMap::new(),
        };
        let at = Utc.with_ymd_and_hms(2026, 2, 2, 8, 0, 0).unwrap();
        CalibrationSnapshot::new("10.0.0.1", "10.0.0.2", room, vec![cam], at)
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, d, 9, 30, 0).unwrap()
    }

    fn touch(path: &Path, body: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, body).unwrap();
    }

    #[test]
    fn test_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nope"));
        assert!(store.list(Some("cork")).unwrap().is_empty());
        assert!(store.latest(Some("cork")).unwrap().is_none());
        assert!(store.load_latest(Some("cork")).unwrap().is_none());
    }

    #[test]
    fn test_list_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        for name in [
            "cork_260206_0900.json",
            "cork_260202_0900.json",
            "cork_latest.json",
            "cork_260203_0900.txt",
            "lab_260204_0900.json",
            "calib_260204_0900.json",
            "cork_notes.json",
        ] {
            touch(&root.join(name), "{}");
        }
        fs::create_dir_all(root.join("cork_260209_0900.json")).unwrap();

        let store = SnapshotStore::new(root);
        assert_eq!(
            store.list_names(Some("cork")).unwrap(),
            vec!["cork_260202_0900.json", "cork_260206_0900.json", "cork_notes.json"]
        );
        assert_eq!(store.list_names(None).unwrap(), vec!["calib_260204_0900.json"]);

        let entries = store.list(Some("cork")).unwrap();
        assert!(entries[2].timestamp.is_none());
        assert!(entries[0].timestamp < entries[1].timestamp);
    }

    #[test]
    fn test_find_at_or_before() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        // Monday, Tuesday, Friday
        for d in [2, 3, 6] {
            store.write_at(Some("cork"), &snapshot("cork", d as f64), day(d)).unwrap();
        }

        let thursday = store.find_at_or_before(Some("cork"), "2026-02-05").unwrap();
        assert_eq!(thursday.unwrap().file_name, "cork_260203_0930.json");

        let before_all = store.find_at_or_before(Some("cork"), "2026-02-01T23:59").unwrap();
        assert!(before_all.is_none());

        let exact = store
            .find_at_or_before(Some("cork"), day(6))
            .unwrap()
            .unwrap();
        assert_eq!(exact.file_name, "cork_260206_0930.json");

        // Same day but before 09:30 resolves to the previous snapshot.
        let early = store.find_at_or_before(Some("cork"), "260206_0929").unwrap();
        assert_eq!(early.unwrap().file_name, "cork_260203_0930.json");

        let naive = NaiveDate::from_ymd_opt(2026, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let later = store.find_at_or_before(Some("cork"), naive).unwrap();
        assert_eq!(later.unwrap().file_name, "cork_260206_0930.json");
    }

    #[test]
    fn test_find_at_or_before_rejects_bad_target() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let err = store.find_at_or_before(Some("cork"), "next friday").unwrap_err();
        assert!(matches!(err, CalibError::InvalidFormat(_)));
    }

    #[test]
    fn test_find_at_or_before_skips_undecodable_names() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("cork_backup.json"), "{}");
        let store = SnapshotStore::new(dir.path());
        assert!(store.find_at_or_before(Some("cork"), "2099-01-01").unwrap().is_none());
    }

    #[test]
    fn test_latest_prefers_snapshots_over_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("latest").join("cork_calib.json"), "{}");
        let store = SnapshotStore::new(root);
        store.write_at(Some("cork"), &snapshot("cork", 1.0), day(2)).unwrap();

        let latest = store.latest(Some("cork")).unwrap().unwrap();
        assert_eq!(latest.file_name, "cork_260202_0930.json");
    }

    #[test]
    fn test_latest_legacy_chain_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let store = SnapshotStore::new(root);

        touch(&root.join("cork_latest.json"), "{}");
        let latest = store.latest(Some("cork")).unwrap().unwrap();
        assert_eq!(latest.path, root.join("cork_latest.json"));
        assert!(latest.timestamp.is_none());

        touch(&root.join("latest").join("cork_calib.json"), "{}");
        let latest = store.latest(Some("cork")).unwrap().unwrap();
        assert_eq!(latest.path, root.join("latest").join("cork_calib.json"));

        assert!(store.latest(None).unwrap().is_none());
        touch(&root.join("calib_latest.json"), "{}");
        assert_eq!(
            store.latest(None).unwrap().unwrap().path,
            root.join("calib_latest.json")
        );
        touch(&root.join("latest").join("calib.json"), "{}");
        assert_eq!(
            store.latest(None).unwrap().unwrap().path,
            root.join("latest").join("calib.json")
        );
    }

    #[test]
    fn test_load_latest_from_legacy_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let doc = snapshot("cork", 4.0).to_pretty_json().unwrap();
        touch(&root.join("cork_latest.json"), &doc);

        let loaded = SnapshotStore::new(root).load_latest(Some("cork")).unwrap().unwrap();
        assert_eq!(loaded, snapshot("cork", 4.0));
    }

    #[test]
    fn test_load_latest_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("cork_260202_0930.json"), "{ not json");
        let err = SnapshotStore::new(dir.path())
            .load_latest(Some("cork"))
            .unwrap_err();
        assert!(matches!(err, CalibError::MalformedDocument { .. }));
    }

    #[test]
    fn test_write_creates_root_and_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("calib"));
        let entry = store.write_at(None, &snapshot("", 1.0), day(4)).unwrap();
        assert_eq!(entry.file_name, "calib_260204_0930.json");
        assert_eq!(entry.timestamp, Some(day(4).naive_utc()));

        let first = fs::read_to_string(&entry.path).unwrap();
        store.write_at(None, &snapshot("", 1.0), day(4)).unwrap();
        let second = fs::read_to_string(&entry.path).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.list(None).unwrap().len(), 1);
    }
}
