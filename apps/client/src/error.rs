//! Client error types.

use thiserror::Error;
use wenbun_core::CoreError;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("deck content not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Sync errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend error: {status} - {message}")]
    Backend { status: u16, message: String },

    #[error("Not authenticated - please log in first")]
    NotAuthenticated,

    #[error("Sync already in progress")]
    AlreadyInProgress,

    #[error("No profile stored on the server")]
    NoRemoteProfile,

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Remote profile rejected: {0}")]
    InvalidRemote(#[from] CoreError),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("loading deck failed: {0}")]
    DeckLoadFailed(#[from] ContentError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("sync is not configured")]
    SyncUnavailable,
}

pub type Result<T> = std::result::Result<T, AppError>;
