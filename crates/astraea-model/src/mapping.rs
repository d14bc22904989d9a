//! Mapping specification entities, the central artifact of the pipeline.
//!
//! A [`DomainMappingSpec`] is proposed by the agent, enriched from the
//! reference store, checked by predict-and-prevent, corrected by the human
//! reviewer, and finally executed by the engine. It is serialized to
//! `<domain>_spec.json` in the study output directory.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::{
    ConfidenceLevel, CoreDesignation, DatasetClass, MappingPattern, Origin, Severity,
    VariableType,
};

/// One variable-level mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMapping {
    /// Target SDTM variable name.
    pub sdtm_variable: String,

    /// Handler pattern for the executor.
    pub pattern: MappingPattern,

    /// Raw dataset the source column lives in, when the pattern reads one.
    #[serde(default)]
    pub source_dataset: Option<String>,

    /// Source column name, when the pattern reads one.
    #[serde(default)]
    pub source_variable: Option<String>,

    /// Derivation rule: a vocabulary keyword call for REFORMAT / DERIVATION /
    /// COMBINE, or the constant value for ASSIGN.
    #[serde(default)]
    pub derivation_rule: Option<String>,

    /// Categorized confidence.
    pub confidence_level: ConfidenceLevel,

    /// Numeric confidence score in [0, 1] the level was derived from.
    pub confidence_score: f64,

    /// Why the agent chose this confidence.
    #[serde(default)]
    pub confidence_rationale: String,

    /// Position within the domain (filled by enrichment).
    #[serde(default)]
    pub order: Option<u32>,

    /// Byte length for character variables (filled by enrichment).
    #[serde(default)]
    pub length: Option<u32>,

    /// Variable label, ≤40 chars (filled by enrichment).
    #[serde(default)]
    pub label: Option<String>,

    /// Data type (filled by enrichment).
    #[serde(default)]
    pub data_type: Option<VariableType>,

    /// Core designation (filled by enrichment).
    #[serde(default)]
    pub core: Option<CoreDesignation>,

    /// Governing codelist code (filled by enrichment, or carried by
    /// LOOKUP_RECODE proposals).
    #[serde(default)]
    pub codelist_code: Option<String>,

    /// Human-readable codelist name (filled by enrichment).
    #[serde(default)]
    pub codelist_name: Option<String>,

    /// Value origin for define.xml.
    #[serde(default)]
    pub origin: Option<Origin>,

    /// Computational method text for derived variables.
    #[serde(default)]
    pub computational_method: Option<String>,
}

impl VariableMapping {
    /// Whether this mapping reads a source column at execution time.
    pub fn reads_source(&self) -> bool {
        !matches!(self.pattern, MappingPattern::Assign)
    }
}

/// A predict-and-prevent finding attached to a spec before execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecIssue {
    /// Stable rule identifier (e.g., "ASTR-PP001").
    pub rule_id: String,

    /// Severity of the finding.
    pub severity: Severity,

    /// The SDTM variable concerned, when variable-scoped.
    #[serde(default)]
    pub variable: Option<String>,

    /// Human-readable message.
    pub message: String,
}

/// The approved (or proposed) mapping specification for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMappingSpec {
    /// Target SDTM domain code.
    pub domain: String,

    /// Dataset class of the domain.
    pub domain_class: DatasetClass,

    /// Dataset structure description.
    pub structure: String,

    /// Raw datasets this spec reads.
    pub source_datasets: BTreeSet<String>,

    /// Variable mappings indexed by SDTM variable name. The index key is
    /// the uppercase variable name, so targets are unique by construction.
    pub variable_mappings: BTreeMap<String, VariableMapping>,

    /// Total variables the domain defines in the reference.
    pub total_variables: usize,

    /// Count of Required variables that have a mapping.
    pub required_mapped: usize,

    /// Required variables with no mapping.
    pub missing_required_variables: Vec<String>,

    /// Findings from predict-and-prevent. Informative; never blocks review.
    #[serde(default)]
    pub predict_prevent_issues: Vec<SpecIssue>,

    /// Ordered SDTM variables defining the output sort.
    pub sort_order: Vec<String>,

    /// Proposed variables that are not in the reference domain and are
    /// therefore SUPPQUAL candidates.
    #[serde(default)]
    pub suppqual_candidates: Vec<String>,
}

impl DomainMappingSpec {
    /// Insert a mapping, keyed by uppercase target name. Returns the
    /// previous mapping when the target was already present.
    pub fn insert(&mut self, mapping: VariableMapping) -> Option<VariableMapping> {
        self.variable_mappings
            .insert(mapping.sdtm_variable.to_uppercase(), mapping)
    }

    /// Look up a mapping by target variable name.
    pub fn mapping(&self, sdtm_variable: &str) -> Option<&VariableMapping> {
        self.variable_mappings
            .get(&sdtm_variable.trim().to_uppercase())
    }

    /// Remove a mapping by target variable name.
    pub fn remove(&mut self, sdtm_variable: &str) -> Option<VariableMapping> {
        self.variable_mappings
            .remove(&sdtm_variable.trim().to_uppercase())
    }

    /// Mappings in enrichment order (by `order`, then name).
    pub fn ordered_mappings(&self) -> Vec<&VariableMapping> {
        let mut mappings: Vec<&VariableMapping> = self.variable_mappings.values().collect();
        mappings.sort_by_key(|m| (m.order.unwrap_or(u32::MAX), m.sdtm_variable.clone()));
        mappings
    }

    /// Whether predict-and-prevent recorded any ERROR finding.
    pub fn has_blocking_issues(&self) -> bool {
        self.predict_prevent_issues
            .iter()
            .any(|i| i.severity == Severity::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(var: &str) -> VariableMapping {
        VariableMapping {
            sdtm_variable: var.to_string(),
            pattern: MappingPattern::Direct,
            source_dataset: Some("dm".to_string()),
            source_variable: Some(var.to_string()),
            derivation_rule: None,
            confidence_level: ConfidenceLevel::High,
            confidence_score: 0.95,
            confidence_rationale: String::new(),
            order: None,
            length: None,
            label: None,
            data_type: None,
            core: None,
            codelist_code: None,
            codelist_name: None,
            origin: Some(Origin::Crf),
            computational_method: None,
        }
    }

    fn empty_spec() -> DomainMappingSpec {
        DomainMappingSpec {
            domain: "DM".to_string(),
            domain_class: DatasetClass::SpecialPurpose,
            structure: "One record per subject".to_string(),
            source_datasets: BTreeSet::new(),
            variable_mappings: BTreeMap::new(),
            total_variables: 0,
            required_mapped: 0,
            missing_required_variables: Vec::new(),
            predict_prevent_issues: Vec::new(),
            sort_order: Vec::new(),
            suppqual_candidates: Vec::new(),
        }
    }

    #[test]
    fn insert_is_keyed_case_insensitively() {
        let mut spec = empty_spec();
        assert!(spec.insert(mapping("AGE")).is_none());
        let mut lower = mapping("age");
        lower.confidence_score = 0.5;
        // Same target: replaces rather than duplicating.
        assert!(spec.insert(lower).is_some());
        assert_eq!(spec.variable_mappings.len(), 1);
        assert!(spec.mapping("Age").is_some());
    }

    #[test]
    fn blocking_detection() {
        let mut spec = empty_spec();
        assert!(!spec.has_blocking_issues());
        spec.predict_prevent_issues.push(SpecIssue {
            rule_id: "ASTR-PP001".to_string(),
            severity: Severity::Error,
            variable: Some("USUBJID".to_string()),
            message: "missing".to_string(),
        });
        assert!(spec.has_blocking_issues());
    }
}
