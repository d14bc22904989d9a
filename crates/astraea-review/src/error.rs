//! Review-gate errors.

use thiserror::Error;

/// Errors raised by the session store and review gate.
#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("session database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("failed to serialize decision: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("terminal interaction failed: {0}")]
    Terminal(#[from] dialoguer::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
