//! Deterministic execution of approved mapping specifications.
//!
//! The engine consumes a reviewed [`astraea_model::DomainMappingSpec`] and
//! the raw DataFrames, dispatches each variable mapping to its pattern
//! handler, runs cross-domain derivations over the full frame map, and
//! finishes with the transport compliance pass. Everything here is pure
//! data transformation; no model calls, no prompts.

#![deny(unsafe_code)]

mod compliance;
mod datetime;
mod derived;
mod engine;
mod error;
mod findings;
mod frame;
mod handlers;
mod resolve;
mod suppqual;
mod usubjid;

pub use crate::compliance::{apply_compliance, fix_common_non_ascii};
pub use crate::datetime::{
    format_partial_iso8601, parse_iso_date, parse_string_date_to_iso, sas_date_to_iso,
    sas_datetime_to_iso,
};
pub use crate::derived::{
    EpochWindow, assign_sequence_numbers, compute_study_day, derive_epoch, derive_visitnum,
    reference_starts_from_dm,
};
pub use crate::engine::{ExecutionContext, execute_domain};
pub use crate::error::TransformError;
pub use crate::findings::{TransposeSpec, TransposeTest, execute_findings};
pub use crate::frame::DomainFrame;
pub use crate::resolve::{ColumnResolver, standard_edc_aliases};
pub use crate::suppqual::{SuppqualCandidate, build_suppqual, validate_suppqual_links};
pub use crate::usubjid::{generate_usubjid, validate_usubjid_consistency};
