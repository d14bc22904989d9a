//! The executed-domain frame type.

use polars::prelude::DataFrame;

/// A produced SDTM dataset: the frame plus its identity and execution
/// warnings worth surfacing to the operator.
#[derive(Debug, Clone)]
pub struct DomainFrame {
    /// SDTM domain code (e.g., "DM", "SUPPLB").
    pub domain: String,

    /// The dataset contents.
    pub data: DataFrame,

    /// Non-fatal warnings collected during execution.
    pub warnings: Vec<String>,
}

impl DomainFrame {
    /// Wrap a frame under a domain code.
    pub fn new(domain: impl Into<String>, data: DataFrame) -> Self {
        Self {
            domain: domain.into(),
            data,
            warnings: Vec::new(),
        }
    }

    /// Number of records.
    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    /// Output filename: lowercase domain plus the transport extension.
    pub fn output_filename(&self) -> String {
        format!("{}.xpt", self.domain.to_lowercase())
    }
}
