//! Learning-store errors.

use thiserror::Error;

/// Errors raised by the learning store and retriever.
#[derive(Debug, Error)]
pub enum LearnError {
    #[error("learning database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] astraea_agent::AgentError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
