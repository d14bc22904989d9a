//! Agent errors.

use thiserror::Error;

/// Errors raised by the LLM client and the mapping agent.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("API credential missing: set {var} in the environment")]
    MissingCredential { var: &'static str },

    #[error("LLM request failed after {attempts} attempts: {message}")]
    RequestExhausted { attempts: u32, message: String },

    #[error("LLM rejected the request ({status}): {message}")]
    BadRequest { status: u16, message: String },

    #[error("LLM returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("unknown derivation keyword: {0}")]
    UnknownKeyword(String),

    #[error("derivation rule has invalid arguments: {0}")]
    InvalidRuleArguments(String),

    #[error(transparent)]
    Standards(#[from] astraea_standards::StandardsError),
}
