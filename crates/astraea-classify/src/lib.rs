//! Raw dataset to SDTM domain classification.
//!
//! Two stages: deterministic heuristics (filename matching with a strict
//! boundary rule plus variable-overlap scoring), then LLM fusion with a
//! fixed confidence adjustment policy. High-scoring heuristics override
//! the model; disagreement is penalized; weak results come back as
//! `UNCLASSIFIED` for the operator to resolve.

#![deny(unsafe_code)]

mod error;
mod fusion;
mod heuristics;

pub use crate::error::ClassifyError;
pub use crate::fusion::{ClassifierAgent, build_domain_plans};
pub use crate::heuristics::{
    HeuristicScores, filename_score, merge_groups, score_dataset, variable_overlap_score,
};
