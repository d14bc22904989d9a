//! Raw dataset ingestion and profiling.
//!
//! The transport-format reader is an external collaborator; this crate
//! consumes its output contract: a tabular [`RawTable`] (polars DataFrame
//! plus per-column source metadata) loaded here from the CSV + sidecar
//! interchange the reader emits. On top of that it provides dataset
//! discovery, the statistical profiler, and the parsed-eCRF cache.

#![deny(unsafe_code)]

mod discovery;
mod ecrf;
mod error;
mod profiler;
mod table;

pub use crate::discovery::{DiscoveredDataset, discover_datasets};
pub use crate::ecrf::{load_ecrf_cache, save_ecrf_cache};
pub use crate::error::IngestError;
pub use crate::profiler::{ProfileSummary, profile_dataset, profile_study};
pub use crate::table::{RawTable, load_raw_table};
