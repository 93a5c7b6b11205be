//! Environment-driven defaults shared by the CLI and demos.

use std::path::PathBuf;
use std::time::Duration;

pub const ENV_CALIB_ROOT: &str = "MOTIVE_CALIB_ROOT";
pub const ENV_PRESETS_DIR: &str = "MOTIVE_PRESETS_DIR";
pub const ENV_SERVER_IP: &str = "MOTIVE_SERVER_IP";
pub const ENV_TIMEOUT_SECS: &str = "MOTIVE_TIMEOUT_SECS";
pub const ENV_ROOM: &str = "MOTIVE_ROOM";
pub const ENV_MULTICAST: &str = "MOTIVE_MULTICAST";

pub const DEFAULT_SERVER_IP: &str = "10.40.49.47";
pub const DEFAULT_TIMEOUT_SECS: f64 = 8.0;
pub const DEFAULT_ROOM: &str = "cork";
pub const DEFAULT_CALIB_ROOT: &str = "calib";

/// Defaults resolved from the environment before command-line flags apply.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub calib_root: PathBuf,
    pub server_ip: String,
    pub timeout: Duration,
    /// Empty selects the default room (`calib_` snapshots, no preset).
    pub room: String,
    pub use_multicast: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let timeout_secs = read_env_f64(ENV_TIMEOUT_SECS, DEFAULT_TIMEOUT_SECS);
        Settings {
            calib_root: read_env_path(ENV_CALIB_ROOT)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CALIB_ROOT)),
            server_ip: read_env_string(ENV_SERVER_IP, DEFAULT_SERVER_IP),
            timeout: timeout_from_secs(timeout_secs),
            room: std::env::var(ENV_ROOM)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|_| DEFAULT_ROOM.to_string()),
            use_multicast: read_env_bool(ENV_MULTICAST, true),
        }
    }
}

/// Seconds to a duration; out-of-range input becomes the default.
pub fn timeout_from_secs(secs: f64) -> Duration {
    if secs.is_finite() && (0.0..1e9).contains(&secs) {
        Duration::from_secs_f64(secs)
    } else {
        Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS)
    }
}

pub fn read_env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .and_then(|v| {
            let v = v.trim().to_ascii_lowercase();
            match v.as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            }
        })
        .unwrap_or(default)
}

pub fn read_env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(default)
}

pub fn read_env_string(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn read_env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_env_bool() {
        std::env::set_var("MOTIVE_CALIB_TEST_BOOL", " Off ");
        assert!(!read_env_bool("MOTIVE_CALIB_TEST_BOOL", true));
        std::env::set_var("MOTIVE_CALIB_TEST_BOOL", "maybe");
        assert!(read_env_bool("MOTIVE_CALIB_TEST_BOOL", true));
        assert!(read_env_bool("MOTIVE_CALIB_TEST_BOOL_UNSET", true));
    }

    #[test]
    fn test_read_env_f64_and_string() {
        std::env::set_var("MOTIVE_CALIB_TEST_F64", "2.5");
        assert_eq!(read_env_f64("MOTIVE_CALIB_TEST_F64", 8.0), 2.5);
        std::env::set_var("MOTIVE_CALIB_TEST_F64", "soon");
        assert_eq!(read_env_f64("MOTIVE_CALIB_TEST_F64", 8.0), 8.0);

        std::env::set_var("MOTIVE_CALIB_TEST_STR", "   ");
        assert_eq!(read_env_string("MOTIVE_CALIB_TEST_STR", "x"), "x");
    }

    #[test]
    fn test_timeout_from_secs() {
        assert_eq!(timeout_from_secs(1.5), Duration::from_millis(1500));
        assert_eq!(timeout_from_secs(-1.0), Duration::from_secs(8));
        assert_eq!(timeout_from_secs(f64::NAN), Duration::from_secs(8));
    }
}
