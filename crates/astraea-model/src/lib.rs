//! Shared data model for the Astraea SDTM pipeline.
//!
//! Every entity that crosses a component boundary lives here: reference
//! metadata (domains, variables, controlled terminology), study-level
//! profiling output, mapping specifications, review decisions, validation
//! findings, and learning examples. All entities are plain serde-friendly
//! data; behavior lives in the component crates.

#![deny(unsafe_code)]

pub mod classify;
pub mod ct;
pub mod domain;
pub mod enums;
pub mod error;
pub mod learning;
pub mod lookup;
pub mod mapping;
pub mod profile;
pub mod review;
pub mod validation;

pub use crate::classify::{DomainClassification, DomainPlan, MappingPatternKind};
pub use crate::ct::{Codelist, CtCatalog, Term};
pub use crate::domain::{DomainSpec, VariableSpec};
pub use crate::enums::{
    ConfidenceLevel, CoreDesignation, CorrectionType, DatasetClass, FixDisposition,
    MappingPattern, Origin, ReviewStatus, RuleCategory, Severity, VariableType,
};
pub use crate::error::ModelError;
pub use crate::learning::{DomainTemplate, LearningExample};
pub use crate::lookup::CaseInsensitiveSet;
pub use crate::mapping::{DomainMappingSpec, SpecIssue, VariableMapping};
pub use crate::profile::{
    DatasetProfile, EcrfField, EcrfForm, VariableMetadata, VariableProfile,
};
pub use crate::review::{DomainReview, HumanCorrection, ReviewDecision, ReviewSession};
pub use crate::validation::{
    DomainValidation, RuleResult, ValidationReport, WhitelistEntry,
};
