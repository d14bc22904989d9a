//! Reference-store errors. All of these are fatal at startup.

use thiserror::Error;

/// Errors raised while loading or verifying the reference bundles.
#[derive(Debug, Error)]
pub enum StandardsError {
    #[error("unsupported manifest schema: {0}")]
    UnsupportedSchema(String),

    #[error("IG version mismatch: bundle has {found}, this build supports {supported}")]
    IgVersionMismatch { found: String, supported: String },

    #[error("CT version mismatch: bundle has {found}, this build supports {supported}")]
    CtVersionMismatch { found: String, supported: String },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("missing bundle role: {0}")]
    MissingRole(String),

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown domain: {0}")]
    UnknownDomain(String),
}
