use std::path::PathBuf;
use thiserror::Error;

/// Startup-time configuration failures. All of these are fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("--{flag} value '{value}' is not a valid duration (use a string like '-1m' or '3m')")]
    InvalidDuration { flag: &'static str, value: String },

    #[error("--gc-age must be negative, e.g. '-1m' (got '{0}')")]
    NonNegativeGcAge(String),

    #[error("--gc-interval must be positive (got '{0}')")]
    NonPositiveInterval(String),

    #[error("shard count must be a power of two between 1 and {max} (got {got})")]
    InvalidShardCount { got: usize, max: usize },

    #[error("queue depth must be at least 1")]
    InvalidQueueDepth,

    #[error("you must specify either a capture device (--dev) or a pcap file (--pcap)")]
    MissingCaptureSource,
}

/// Failure to decode the link, network or transport headers of a captured frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("truncated or malformed {0} header")]
    Truncated(&'static str),
}

/// Failure to serialize a log record. Kept alongside the record so sinks can skip it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("failed to encode record: {0}")]
    Json(String),
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        EncodeError::Json(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SnifferError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("could not open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported capture link type {0}")]
    UnsupportedLinkType(i32),

    #[error("shard {0} queue closed while capture was running")]
    ShardClosed(usize),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
