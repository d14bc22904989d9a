//! Type-safe enumerations shared across the pipeline.
//!
//! These enums give compile-time safety to concepts that are plain strings
//! in standards files and JSON artifacts.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Dataset class per SDTM-IG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetClass {
    /// Interventions: CM, EX, PR, SU
    Interventions,
    /// Events: AE, DS, DV, MH
    Events,
    /// Findings: DA, EG, IE, LB, PE, QS, SC, VS, FA
    Findings,
    /// Special-Purpose: CO, DM, SE, SV
    SpecialPurpose,
    /// Trial Design: TA, TE, TI, TS, TV
    TrialDesign,
    /// Relationship: RELREC, SUPPQUAL
    Relationship,
}

impl DatasetClass {
    /// Returns the canonical class name as it appears in SDTM-IG.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interventions => "Interventions",
            Self::Events => "Events",
            Self::Findings => "Findings",
            Self::SpecialPurpose => "Special-Purpose",
            Self::TrialDesign => "Trial Design",
            Self::Relationship => "Relationship",
        }
    }

    /// Returns true for the Findings class, which is stored wide at the
    /// source and transposed to the tall SDTM structure.
    pub fn is_findings(&self) -> bool {
        matches!(self, Self::Findings)
    }
}

impl fmt::Display for DatasetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DatasetClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "INTERVENTIONS" => Ok(Self::Interventions),
            "EVENTS" => Ok(Self::Events),
            "FINDINGS" | "FINDINGS ABOUT" => Ok(Self::Findings),
            "SPECIAL PURPOSE" => Ok(Self::SpecialPurpose),
            "TRIAL DESIGN" => Ok(Self::TrialDesign),
            "RELATIONSHIP" => Ok(Self::Relationship),
            _ => Err(format!("Unknown dataset class: {s}")),
        }
    }
}

/// Variable data type: SDTM supports only character and numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariableType {
    /// Character/text data.
    Char,
    /// Numeric data (8-byte IEEE float in SAS).
    Num,
}

impl VariableType {
    /// Returns the name used in standards files and define.xml datatype mapping.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Char => "Char",
            Self::Num => "Num",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VariableType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CHAR" | "CHARACTER" | "TEXT" => Ok(Self::Char),
            "NUM" | "NUMERIC" => Ok(Self::Num),
            _ => Err(format!("Unknown variable type: {s}")),
        }
    }
}

/// Core designation: Required, Expected, or Permissible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoreDesignation {
    /// Must be present; null values are not allowed.
    Required,
    /// Should be present when applicable; nulls allowed.
    Expected,
    /// Optional.
    Permissible,
}

impl CoreDesignation {
    /// Returns the short code as it appears in standards files.
    pub fn as_code(&self) -> &'static str {
        match self {
            Self::Required => "Req",
            Self::Expected => "Exp",
            Self::Permissible => "Perm",
        }
    }

    /// Returns true if the variable must be present and non-null.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Required)
    }
}

impl fmt::Display for CoreDesignation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_code())
    }
}

impl FromStr for CoreDesignation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "REQ" | "REQUIRED" => Ok(Self::Required),
            "EXP" | "EXPECTED" => Ok(Self::Expected),
            "PERM" | "PERMISSIBLE" => Ok(Self::Permissible),
            _ => Err(format!("Unknown core designation: {s}")),
        }
    }
}

/// Mapping pattern assigned to a variable mapping.
///
/// The pattern selects the executor handler; `Derivation`, `Reformat` and
/// `Combine` additionally carry a derivation rule from the closed vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MappingPattern {
    /// Copy a source column as-is.
    Direct,
    /// Copy a source column under the SDTM name.
    Rename,
    /// Reshape a single source value (dates, codes).
    Reformat,
    /// Split one source column into several targets. Deferred: executes as NULL.
    Split,
    /// Combine several source columns into one target.
    Combine,
    /// Compute from one or more columns via a derivation rule.
    Derivation,
    /// Recode through a controlled-terminology codelist.
    LookupRecode,
    /// Wide-to-tall restructuring handled by the findings executor.
    Transpose,
    /// Fill with a constant value.
    Assign,
}

impl MappingPattern {
    /// Returns the canonical name used in specs and prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "DIRECT",
            Self::Rename => "RENAME",
            Self::Reformat => "REFORMAT",
            Self::Split => "SPLIT",
            Self::Combine => "COMBINE",
            Self::Derivation => "DERIVATION",
            Self::LookupRecode => "LOOKUP_RECODE",
            Self::Transpose => "TRANSPOSE",
            Self::Assign => "ASSIGN",
        }
    }
}

impl fmt::Display for MappingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MappingPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DIRECT" => Ok(Self::Direct),
            "RENAME" => Ok(Self::Rename),
            "REFORMAT" => Ok(Self::Reformat),
            "SPLIT" => Ok(Self::Split),
            "COMBINE" => Ok(Self::Combine),
            "DERIVATION" => Ok(Self::Derivation),
            "LOOKUP_RECODE" => Ok(Self::LookupRecode),
            "TRANSPOSE" => Ok(Self::Transpose),
            "ASSIGN" => Ok(Self::Assign),
            _ => Err(format!("Unknown mapping pattern: {s}")),
        }
    }
}

/// Origin of an SDTM variable value, as recorded in define.xml.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Collected on the case report form.
    Crf,
    /// Computed by the pipeline.
    Derived,
    /// Assigned a constant by the sponsor.
    Assigned,
    /// Taken from the protocol.
    Protocol,
    /// Received through electronic data transfer.
    Edt,
    /// Copied from a predecessor dataset.
    Predecessor,
}

impl Origin {
    /// Returns the define.xml origin string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crf => "CRF",
            Self::Derived => "Derived",
            Self::Assigned => "Assigned",
            Self::Protocol => "Protocol",
            Self::Edt => "eDT",
            Self::Predecessor => "Predecessor",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Origin {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CRF" => Ok(Self::Crf),
            "DERIVED" => Ok(Self::Derived),
            "ASSIGNED" => Ok(Self::Assigned),
            "PROTOCOL" => Ok(Self::Protocol),
            "EDT" => Ok(Self::Edt),
            "PREDECESSOR" => Ok(Self::Predecessor),
            _ => Err(format!("Unknown origin: {s}")),
        }
    }
}

/// Confidence level derived from a numeric score.
///
/// Thresholds: High ≥ 0.85, Medium ≥ 0.60, Low below.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    /// Weak match requiring manual confirmation.
    Low,
    /// Reasonable match that should be reviewed.
    Medium,
    /// Near-certain match.
    High,
}

/// Score boundary between medium and high confidence.
pub const CONFIDENCE_HIGH: f64 = 0.85;
/// Score boundary between low and medium confidence.
pub const CONFIDENCE_MEDIUM: f64 = 0.60;

impl ConfidenceLevel {
    /// Categorize a numeric confidence score.
    pub fn from_score(score: f64) -> Self {
        if score >= CONFIDENCE_HIGH {
            Self::High
        } else if score >= CONFIDENCE_MEDIUM {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the lowercase name used in specs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of a validation finding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational; never blocks submission.
    Notice,
    /// Should be reviewed; does not block submission.
    Warning,
    /// Blocks submission unless whitelisted.
    Error,
}

impl Severity {
    /// Returns the uppercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warning => "WARNING",
            Self::Notice => "NOTICE",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    /// Controlled terminology conformance.
    Terminology,
    /// Variable/column presence and population.
    Presence,
    /// Cross-column and cross-domain consistency.
    Consistency,
    /// Size and length limits.
    Limit,
    /// Value formats (ISO 8601, ASCII, filenames).
    Format,
    /// FDA business rules.
    FdaBusiness,
    /// FDA Technical Rejection Criteria.
    FdaTrc,
}

impl RuleCategory {
    /// Returns the uppercase name used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Terminology => "TERMINOLOGY",
            Self::Presence => "PRESENCE",
            Self::Consistency => "CONSISTENCY",
            Self::Limit => "LIMIT",
            Self::Format => "FORMAT",
            Self::FdaBusiness => "FDA_BUSINESS",
            Self::FdaTrc => "FDA_TRC",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of reviewer decision on a proposed mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CorrectionType {
    /// Proposal accepted unchanged.
    Accept,
    /// Proposal replaced with a corrected mapping.
    Modify,
    /// Proposal removed from the spec.
    Reject,
    /// Reviewer added a mapping for an unmapped target.
    Add,
}

impl CorrectionType {
    /// Returns true when the decision represents a correction the learning
    /// store should weight (only MODIFY).
    pub fn is_correction(&self) -> bool {
        matches!(self, Self::Modify)
    }

    /// Returns the uppercase name used in session records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Modify => "MODIFY",
            Self::Reject => "REJECT",
            Self::Add => "ADD",
        }
    }
}

impl fmt::Display for CorrectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CorrectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ACCEPT" => Ok(Self::Accept),
            "MODIFY" => Ok(Self::Modify),
            "REJECT" => Ok(Self::Reject),
            "ADD" => Ok(Self::Add),
            _ => Err(format!("Unknown correction type: {s}")),
        }
    }
}

/// Progress state of a domain review.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    /// Not yet opened.
    #[default]
    Pending,
    /// Some variables decided.
    InProgress,
    /// Every variable decided.
    Completed,
}

impl ReviewStatus {
    /// Returns the uppercase name used in session records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            _ => Err(format!("Unknown review status: {s}")),
        }
    }
}

/// Disposition assigned to a validation finding by the auto-fixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixDisposition {
    /// The fixer can repair this deterministically.
    AutoFixable,
    /// Requires source data or human judgment.
    NeedsHuman,
    /// Informational; nothing to repair.
    Informational,
}

impl FixDisposition {
    /// Returns the uppercase name used in the audit trail.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoFixable => "AUTO_FIXABLE",
            Self::NeedsHuman => "NEEDS_HUMAN",
            Self::Informational => "INFORMATIONAL",
        }
    }
}

impl fmt::Display for FixDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_class_round_trips() {
        assert_eq!(
            "Special-Purpose".parse::<DatasetClass>().unwrap(),
            DatasetClass::SpecialPurpose
        );
        assert_eq!("findings".parse::<DatasetClass>().unwrap(), DatasetClass::Findings);
        assert_eq!(DatasetClass::TrialDesign.as_str(), "Trial Design");
    }

    #[test]
    fn confidence_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(0.85), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.84), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.60), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.59), ConfidenceLevel::Low);
    }

    #[test]
    fn severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Notice);
    }

    #[test]
    fn correction_type_weighting() {
        assert!(CorrectionType::Modify.is_correction());
        assert!(!CorrectionType::Accept.is_correction());
        assert!(!CorrectionType::Reject.is_correction());
        assert!(!CorrectionType::Add.is_correction());
    }

    #[test]
    fn mapping_pattern_parse() {
        assert_eq!(
            "LOOKUP_RECODE".parse::<MappingPattern>().unwrap(),
            MappingPattern::LookupRecode
        );
        assert!("FREEFORM".parse::<MappingPattern>().is_err());
    }
}
