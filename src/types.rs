use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Current on-disk snapshot format.
pub const FORMAT_VERSION: u32 = 1;

/// Padding used when a source position has fewer than three components.
pub const DEFAULT_POSITION: [f64; 3] = [0.0, 0.0, 0.0];

/// Identity quaternion [qx, qy, qz, qw] used to pad short orientations.
pub const DEFAULT_ORIENTATION: [f64; 4] = [0.0, 0.0, 0.0, 1.0];

/// Camera entry as delivered by the model definition, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCameraDescription {
    pub name: String,
    pub position: Vec<f64>,
    pub orientation: Vec<f64>,
    /// Fields beyond name/position/orientation, carried through to the snapshot.
    pub extra: BTreeMap<String, Value>,
}

/// Static rig configuration received in answer to a model-definition request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelDefinition {
    pub cameras: Vec<RawCameraDescription>,
}

/// One physical camera of the rig.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescription {
    #[serde(default = "default_camera_name")]
    pub name: String,
    /// Numeric serial parsed from a `#<digits>` fragment of the name.
    #[serde(default)]
    pub serial: Option<u64>,
    /// Position in meters [x, y, z].
    #[serde(default = "default_position", deserialize_with = "deserialize_position")]
    pub position: [f64; 3],
    /// Quaternion [qx, qy, qz, qw].
    #[serde(
        default = "default_orientation",
        deserialize_with = "deserialize_orientation"
    )]
    pub orientation: [f64; 4],
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CameraDescription {
    /// Normalize a raw model-definition camera: pad/truncate the vectors and
    /// pull the serial out of the name.
    pub fn from_raw(raw: RawCameraDescription) -> Self {
        CameraDescription {
            serial: parse_serial(&raw.name),
            position: normalize_position(&raw.position),
            orientation: normalize_orientation(&raw.orientation),
            name: raw.name,
            extra: raw.extra,
        }
    }
}

/// One persisted calibration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSnapshot {
    #[serde(default = "default_format_version")]
    pub format_version: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub generated_at_utc: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub server_ip: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub client_ip: String,
    /// Room key; empty for the default room.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub room: String,
    #[serde(default)]
    pub cameras: Vec<CameraDescription>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl CalibrationSnapshot {
    pub fn new(
        server_ip: impl Into<String>,
        client_ip: impl Into<String>,
        room: impl Into<String>,
        cameras: Vec<CameraDescription>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        CalibrationSnapshot {
            format_version: FORMAT_VERSION,
            generated_at_utc: generated_at.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            server_ip: server_ip.into(),
            client_ip: client_ip.into(),
            room: room.into(),
            cameras,
            extra: BTreeMap::new(),
        }
    }

    /// JSON value of the document. Object keys come out sorted.
    pub fn to_value(&self) -> crate::Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deterministic pretty-printed document, keys sorted, two-space indent.
    pub fn to_pretty_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_value()?)?)
    }
}

/// Extract the first `#<digits>` serial from a camera name.
pub fn parse_serial(name: &str) -> Option<u64> {
    static SERIAL_PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = SERIAL_PATTERN
        .get_or_init(|| Regex::new(r"#\s*(\d+)").ok())
        .as_ref()?;
    let caps = pattern.captures(name)?;
    caps.get(1)?.as_str().parse().ok()
}

/// Pad with zeros or truncate to exactly three components.
pub fn normalize_position(values: &[f64]) -> [f64; 3] {
    let mut out = DEFAULT_POSITION;
    for (slot, v) in out.iter_mut().zip(values) {
        *slot = *v;
    }
    out
}

/// Append the identity quaternion, then keep the first four components.
///
/// `[a, b]` becomes `[a, b, 0, 0]`; an empty list becomes the identity.
pub fn normalize_orientation(values: &[f64]) -> [f64; 4] {
    let mut out = [0.0; 4];
    for (slot, v) in out
        .iter_mut()
        .zip(values.iter().chain(DEFAULT_ORIENTATION.iter()))
    {
        *slot = *v;
    }
    out
}

fn default_camera_name() -> String {
    "Camera".to_string()
}

fn default_position() -> [f64; 3] {
    DEFAULT_POSITION
}

fn default_orientation() -> [f64; 4] {
    DEFAULT_ORIENTATION
}

fn default_format_version() -> u32 {
    FORMAT_VERSION
}

fn deserialize_position<'de, D: Deserializer<'de>>(d: D) -> Result<[f64; 3], D::Error> {
    let values = Vec::<f64>::deserialize(d)?;
    Ok(normalize_position(&values))
}

fn deserialize_orientation<'de, D: Deserializer<'de>>(d: D) -> Result<[f64; 4], D::Error> {
    let values = Vec::<f64>::deserialize(d)?;
    Ok(normalize_orientation(&values))
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}
