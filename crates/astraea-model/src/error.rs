//! Model-level errors.

use thiserror::Error;

/// Errors raised when constructing model entities from untrusted input.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid domain code: {0}")]
    InvalidDomainCode(String),

    #[error("invalid variable name: {0}")]
    InvalidVariableName(String),

    #[error("duplicate mapping target: {0}")]
    DuplicateTarget(String),

    #[error("invalid enum value for {field}: {value}")]
    InvalidEnumValue { field: &'static str, value: String },
}
