//! Execution-engine errors.

use thiserror::Error;

/// Errors raised while executing a mapping specification.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("source dataset not loaded: {0}")]
    MissingDataset(String),

    #[error("cannot resolve column for critical variable {variable}: {token:?}")]
    CriticalColumnUnresolved { variable: String, token: String },

    #[error("failed to produce critical variable {variable}: {message}")]
    CriticalVariableFailed { variable: String, message: String },

    #[error("USUBJID component is missing: {0}")]
    UsubjidComponentMissing(String),

    #[error("unknown derivation keyword for {variable}: {rule}")]
    UnknownKeyword { variable: String, rule: String },

    #[error("transport compliance failed:\n{}", .0.join("\n"))]
    ComplianceViolations(Vec<String>),

    #[error("dataframe operation failed: {0}")]
    Frame(String),
}

impl From<polars::prelude::PolarsError> for TransformError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::Frame(err.to_string())
    }
}
