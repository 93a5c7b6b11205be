//! `YYMMDD_HHMM` tokens embedded in snapshot filenames.
//!
//! Tokens are UTC wall-clock at minute resolution. They are fixed width, so
//! sorting filenames sorts snapshots chronologically.

use crate::{CalibError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Two-digit years parse as 1970-2069 (`%y`), so tokens round-trip for
/// instants in 2000-2069 only.
pub const TOKEN_FORMAT: &str = "%y%m%d_%H%M";
pub const TOKEN_LEN: usize = 11;
pub const SNAPSHOT_SUFFIX: &str = ".json";
pub const DEFAULT_PREFIX: &str = "calib_";

/// Filename prefix for a room: `"<room>_"`, or `"calib_"` for the default room.
pub fn room_prefix(room: Option<&str>) -> String {
    match room {
        Some(r) if !r.is_empty() => format!("{}_", r),
        _ => DEFAULT_PREFIX.to_string(),
    }
}

/// Format an instant as a token. Seconds are dropped.
pub fn encode(instant: DateTime<Utc>) -> String {
    instant.format(TOKEN_FORMAT).to_string()
}

/// Parse a bare `YYMMDD_HHMM` token.
pub fn parse_token(token: &str) -> Option<NaiveDateTime> {
    let bytes = token.as_bytes();
    if bytes.len() != TOKEN_LEN || bytes[6] != b'_' {
        return None;
    }
    let digits_ok = bytes
        .iter()
        .enumerate()
        .all(|(i, b)| i == 6 || b.is_ascii_digit());
    if !digits_ok {
        return None;
    }
    NaiveDateTime::parse_from_str(token, TOKEN_FORMAT).ok()
}

/// Decode the instant embedded in a snapshot filename for `room`.
///
/// Returns `None` when the prefix or suffix doesn't match or the token is not a
/// valid `YYMMDD_HHMM`; callers skip such names.
pub fn decode(file_name: &str, room: Option<&str>) -> Option<NaiveDateTime> {
    let prefix = room_prefix(room);
    let token = file_name
        .strip_prefix(prefix.as_str())?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    parse_token(token)
}

/// Snapshot filename for `room` at `instant`.
pub fn snapshot_file_name(room: Option<&str>, instant: DateTime<Utc>) -> String {
    format!("{}{}{}", room_prefix(room), encode(instant), SNAPSHOT_SUFFIX)
}

/// Target of an at-or-before query: an instant, or user text still to be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Instant(NaiveDateTime),
    Text(String),
}

impl Target {
    /// Resolve to a UTC wall-clock instant.
    pub fn resolve(&self) -> Result<NaiveDateTime> {
        match self {
            Target::Instant(t) => Ok(*t),
            Target::Text(text) => parse_target(text),
        }
    }
}

impl From<NaiveDateTime> for Target {
    fn from(t: NaiveDateTime) -> Self {
        Target::Instant(t)
    }
}

impl From<DateTime<Utc>> for Target {
    fn from(t: DateTime<Utc>) -> Self {
        Target::Instant(t.naive_utc())
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        Target::Text(s.to_string())
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        Target::Text(s)
    }
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM`, or `YYMMDD_HHMM`, tried in that order.
/// A bare date means midnight.
pub fn parse_target(text: &str) -> Result<NaiveDateTime> {
    let text = text.trim();
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(midnight);
        }
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M") {
        return Ok(t);
    }
    parse_token(text).ok_or_else(|| CalibError::InvalidFormat(text.to_string()))
}
