//! Ingestion errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading raw study data.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("data directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse table {path}: {message}")]
    TableParse { path: PathBuf, message: String },

    #[error("failed to parse metadata sidecar {path}: {source}")]
    MetadataParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse eCRF cache {path}: {source}")]
    EcrfParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, IngestError>;
