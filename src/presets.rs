//! Room presets: connection defaults stored as `<presets>/<room>/room.json`.

use crate::config;
use crate::{CalibError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

pub const ROOM_FILE: &str = "room.json";
pub const BUNDLED_DIR: &str = "preset_assets";

pub const DEFAULT_SERVER_IP: &str = "localhost";
pub const DEFAULT_CLIENT_IP: &str = "auto";
pub const DEFAULT_USE_MULTICAST: bool = true;

/// Partial connection settings. Later layers win when merged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionOverrides {
    pub server_ip: Option<String>,
    pub client_ip: Option<String>,
    pub use_multicast: Option<bool>,
}

impl ConnectionOverrides {
    /// Read the recognised keys of a preset mapping; other keys are ignored.
    fn from_map(map: &Map<String, Value>, room: &str) -> Result<Self> {
        let string = |key: &str| -> Result<Option<String>> {
            match map.get(key) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(other) => Err(CalibError::Configuration(format!(
                    "Room '{}': '{}' must be a string, got {}",
                    room, key, other
                ))),
            }
        };
        let use_multicast = match map.get("use_multicast") {
            None | Some(Value::Null) => None,
            Some(Value::Bool(b)) => Some(*b),
            Some(other) => {
                return Err(CalibError::Configuration(format!(
                    "Room '{}': 'use_multicast' must be a boolean, got {}",
                    room, other
                )))
            }
        };
        Ok(ConnectionOverrides {
            server_ip: string("server_ip")?,
            client_ip: string("client_ip")?,
            use_multicast,
        })
    }

    /// Layer `other` on top of `self`.
    pub fn merge(&mut self, other: &ConnectionOverrides) {
        if let Some(v) = &other.server_ip {
            self.server_ip = Some(v.clone());
        }
        if let Some(v) = &other.client_ip {
            self.client_ip = Some(v.clone());
        }
        if let Some(v) = other.use_multicast {
            self.use_multicast = Some(v);
        }
    }

    /// Fill the gaps with the fallback defaults.
    pub fn resolve(self) -> Connection {
        Connection {
            server_ip: self
                .server_ip
                .unwrap_or_else(|| DEFAULT_SERVER_IP.to_string()),
            client_ip: self
                .client_ip
                .unwrap_or_else(|| DEFAULT_CLIENT_IP.to_string()),
            use_multicast: self.use_multicast.unwrap_or(DEFAULT_USE_MULTICAST),
        }
    }
}

/// Fully resolved connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub server_ip: String,
    pub client_ip: String,
    pub use_multicast: bool,
}

impl Default for Connection {
    fn default() -> Self {
        ConnectionOverrides::default().resolve()
    }
}

/// Connection defaults for one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPreset {
    /// Room key: the preset directory name and the snapshot filename prefix.
    /// Empty for the default room.
    pub key: String,
    /// Display label.
    pub name: String,
    pub connection: Connection,
}

impl RoomPreset {
    /// Preset for the default room, built from explicit settings.
    pub fn unnamed(connection: Connection) -> Self {
        RoomPreset {
            key: String::new(),
            name: "default".to_string(),
            connection,
        }
    }

    /// Room key as the store expects it.
    pub fn room(&self) -> Option<&str> {
        if self.key.is_empty() {
            None
        } else {
            Some(&self.key)
        }
    }
}

/// Handle to a preset directory. Create once at startup and pass it down.
#[derive(Debug, Clone)]
pub struct PresetCatalog {
    root: PathBuf,
}

impl PresetCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        PresetCatalog { root: root.into() }
    }

    /// Find the preset directory: `MOTIVE_PRESETS_DIR`, then `preset_assets/`
    /// beside the executable, then the copy shipped with the crate sources.
    pub fn locate() -> Result<Self> {
        if let Some(dir) = config::read_env_path(config::ENV_PRESETS_DIR) {
            if dir.is_dir() {
                return Ok(Self::new(dir));
            }
            return Err(CalibError::Configuration(format!(
                "{} points at {}, which is not a directory",
                config::ENV_PRESETS_DIR,
                dir.display()
            )));
        }

        let beside_exe = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|p| p.join(BUNDLED_DIR)));
        let bundled = Path::new(env!("CARGO_MANIFEST_DIR")).join(BUNDLED_DIR);

        beside_exe
            .into_iter()
            .chain(std::iter::once(bundled))
            .find(|p| p.is_dir())
            .map(Self::new)
            .ok_or_else(|| {
                CalibError::Configuration(
                    "No presets directory found; set MOTIVE_PRESETS_DIR".to_string(),
                )
            })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rooms that have a `room.json`, sorted. Empty if the directory is missing.
    pub fn list_rooms(&self) -> Result<Vec<String>> {
        let read_dir = match fs::read_dir(&self.root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CalibError::storage(&self.root, e)),
        };

        let mut rooms = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| CalibError::storage(&self.root, e))?;
            let path = entry.path();
            if path.is_dir() && path.join(ROOM_FILE).exists() {
                rooms.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        rooms.sort();
        Ok(rooms)
    }

    /// Load a room and merge its connection settings.
    ///
    /// Precedence, lowest first: the file's `default` block, its `connection`
    /// block, then `overrides`. Anything still unset falls back to
    /// `localhost` / `auto` / multicast.
    pub fn load_room(
        &self,
        room: &str,
        overrides: Option<&ConnectionOverrides>,
    ) -> Result<RoomPreset> {
        let room_file = self.root.join(room).join(ROOM_FILE);
        if !room_file.is_file() {
            return Err(CalibError::Configuration(format!(
                "Room preset '{}' not found at {}",
                room,
                room_file.display()
            )));
        }

        let text =
            fs::read_to_string(&room_file).map_err(|e| CalibError::storage(&room_file, e))?;
        let raw: Value = serde_json::from_str(&text).map_err(|e| {
            CalibError::Configuration(format!("Invalid preset {}: {}", room_file.display(), e))
        })?;
        let Value::Object(raw) = raw else {
            return Err(CalibError::Configuration(format!(
                "Preset {} is not a JSON object",
                room_file.display()
            )));
        };

        let name = match raw.get("room") {
            Some(Value::String(label)) => label.clone(),
            _ => room.to_string(),
        };

        let mut merged = ConnectionOverrides::default();
        for block in ["default", "connection"] {
            // Non-object blocks are treated as empty.
            if let Some(Value::Object(map)) = raw.get(block) {
                merged.merge(&ConnectionOverrides::from_map(map, room)?);
            }
        }
        if let Some(o) = overrides {
            merged.merge(o);
        }

        let connection = merged.resolve();
        log::debug!("Loaded room '{}' ({}): {:?}", room, name, connection);
        Ok(RoomPreset {
            key: room.to_string(),
            name,
            connection,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_room(root: &Path, room: &str, body: &str) {
        let dir = root.join(room);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(ROOM_FILE), body).unwrap();
    }

    #[test]
    fn test_list_rooms() {
        let dir = tempfile::tempdir().unwrap();
        write_room(dir.path(), "lab", "{}");
        write_room(dir.path(), "cork", "{}");
        fs::create_dir_all(dir.path().join("empty")).unwrap();
        fs::write(dir.path().join("stray.json"), "{}").unwrap();

        let catalog = PresetCatalog::new(dir.path());
        assert_eq!(catalog.list_rooms().unwrap(), vec!["cork", "lab"]);
        assert!(PresetCatalog::new(dir.path().join("missing"))
            .list_rooms()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_merge_precedence() {
        let dir = tempfile::tempdir().unwrap();
        write_room(
            dir.path(),
            "cork",
            r#"{
                "room": "Cork Lab",
                "default": {"server_ip": "10.0.0.1", "client_ip": "10.0.0.9", "use_multicast": false, "fps": 120},
                "connection": {"server_ip": "10.40.49.47"}
            }"#,
        );
        let catalog = PresetCatalog::new(dir.path());

        let preset = catalog.load_room("cork", None).unwrap();
        assert_eq!(preset.key, "cork");
        assert_eq!(preset.name, "Cork Lab");
        assert_eq!(preset.room(), Some("cork"));
        assert_eq!(
            preset.connection,
            Connection {
                server_ip: "10.40.49.47".into(),
                client_ip: "10.0.0.9".into(),
                use_multicast: false,
            }
        );

        let overrides = ConnectionOverrides {
            client_ip: Some("auto".into()),
            use_multicast: Some(true),
            ..Default::default()
        };
        let preset = catalog.load_room("cork", Some(&overrides)).unwrap();
        assert_eq!(preset.connection.server_ip, "10.40.49.47");
        assert_eq!(preset.connection.client_ip, "auto");
        assert!(preset.connection.use_multicast);
    }

    #[test]
    fn test_fallback_defaults_and_bad_blocks() {
        let dir = tempfile::tempdir().unwrap();
        write_room(dir.path(), "bare", r#"{"default": [1, 2], "connection": "nope"}"#);
        let preset = PresetCatalog::new(dir.path()).load_room("bare", None).unwrap();
        assert_eq!(preset.name, "bare");
        assert_eq!(preset.connection, Connection::default());
        assert_eq!(preset.connection.server_ip, "localhost");
        assert_eq!(preset.connection.client_ip, "auto");
        assert!(preset.connection.use_multicast);
    }

    #[test]
    fn test_configuration_errors() {
        let dir = tempfile::tempdir().unwrap();
        write_room(dir.path(), "broken", "{ nope");
        write_room(dir.path(), "typed", r#"{"connection": {"use_multicast": "yes"}}"#);
        let catalog = PresetCatalog::new(dir.path());

        for room in ["missing", "broken", "typed"] {
            let err = catalog.load_room(room, None).unwrap_err();
            assert!(matches!(err, CalibError::Configuration(_)), "{}: {}", room, err);
        }
    }

    #[test]
    fn test_bundled_presets_load() {
        let catalog = PresetCatalog::new(Path::new(env!("CARGO_MANIFEST_DIR")).join(BUNDLED_DIR));
        assert!(catalog.list_rooms().unwrap().contains(&"cork".to_string()));
        let preset = catalog.load_room("cork", None).unwrap();
        assert_eq!(preset.connection.server_ip, "10.40.49.47");
    }

    #[test]
    fn test_unnamed_room() {
        let preset = RoomPreset::unnamed(Connection::default());
        assert_eq!(preset.room(), None);
    }
}
