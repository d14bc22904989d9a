//! SAS Transport v5 (XPT) reading and writing.
//!
//! Implements the subset of the transport format a submission package
//! needs: one dataset per file, character and numeric variables, labels,
//! and a reader sufficient to verify a written file against its source.
//!
//! # Format
//!
//! An XPT file is a sequence of 80-byte records:
//!
//! 1. Library header + two real headers (version, OS, timestamps)
//! 2. Member header + DSCRPTR header + member data/second records
//! 3. NAMESTR header + one 140-byte NAMESTR per variable (padded)
//! 4. OBS header + fixed-width observation rows (padded)
//!
//! Numeric values use the IBM System/360 double format; missing numerics
//! encode as `.` followed by zero bytes.

#![deny(unsafe_code)]

mod error;
mod float;
mod header;
mod reader;
mod types;
mod writer;

pub use crate::error::XptError;
pub use crate::float::{ibm_to_ieee, ieee_to_ibm};
pub use crate::reader::read_xpt;
pub use crate::types::{XptColumn, XptDataset, XptType, XptValue, XptWriterOptions};
pub use crate::writer::write_xpt;

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, XptError>;
