use std::path::PathBuf;

/// Core error type for the bridge.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can handle failures consistently (user-facing message vs logged error).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("chat platform error: {0}")]
    Platform(String),

    #[error("zoom error: {0}")]
    Provider(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
