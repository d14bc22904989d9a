//! Transport-format errors.

use thiserror::Error;

/// Errors raised while reading or writing XPT files.
#[derive(Debug, Error)]
pub enum XptError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid dataset name: {0:?}")]
    InvalidDatasetName(String),

    #[error("invalid variable name: {0:?}")]
    InvalidVariableName(String),

    #[error("duplicate variable: {0}")]
    DuplicateVariable(String),

    #[error("variable {0} has zero length")]
    ZeroLength(String),

    #[error("row has {actual} values but the dataset has {expected} columns")]
    RowLengthMismatch { expected: usize, actual: usize },

    #[error("not a valid XPT file: {0}")]
    InvalidFormat(String),

    #[error("missing header record: {0}")]
    MissingHeader(&'static str),

    #[error("invalid NAMESTR record {index}: {message}")]
    InvalidNamestr { index: usize, message: String },
}
