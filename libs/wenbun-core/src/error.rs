//! Error types for wenbun-core.

use thiserror::Error;

/// Result type alias using CoreError.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised by the scheduling engine.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("deck not found: {0}")]
    DeckNotFound(String),

    #[error("card {card_id} is out of range for deck {deck_id}")]
    CardNotFound { deck_id: String, card_id: u32 },

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("invalid learning step '{0}'")]
    InvalidLearningStep(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid profile: {0}")]
    InvalidProfile(String),

    #[error("malformed profile payload: {0}")]
    Malformed(#[from] serde_json::Error),
}
