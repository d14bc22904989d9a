//! Classification errors.

use thiserror::Error;

/// Errors raised during domain classification.
#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classifier output was malformed: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Agent(#[from] astraea_agent::AgentError),

    #[error(transparent)]
    Standards(#[from] astraea_standards::StandardsError),
}
