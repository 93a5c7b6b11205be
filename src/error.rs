use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while fetching, storing, or loading calibration snapshots.
#[derive(Debug, thiserror::Error)]
pub enum CalibError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported date format '{0}'. Use YYYY-MM-DD, YYYY-MM-DDTHH:MM, or YYMMDD_HHMM")]
    InvalidFormat(String),

    #[error("Failed to start NatNet client: {0}")]
    FetchStartFailure(String),

    #[error("Timed out after {0:?} waiting for camera descriptions from Motive")]
    FetchTimeout(Duration),

    #[error("I/O error on {}: {source}", .path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed calibration document {}: {source}", .path.display())]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("Malformed NatNet packet: {0}")]
    Protocol(String),
}

impl CalibError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CalibError::StorageIo {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        CalibError::MalformedDocument {
            path: path.into(),
            source,
        }
    }
}
