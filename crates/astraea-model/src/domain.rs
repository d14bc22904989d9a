//! SDTM-IG domain and variable definitions.

use serde::{Deserialize, Serialize};

use crate::enums::{CoreDesignation, DatasetClass, VariableType};

/// An SDTM variable definition from the implementation guide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    /// Position within the domain (1-based).
    pub order: u32,

    /// Variable name (≤8 chars, uppercase).
    pub name: String,

    /// Variable label (≤40 chars).
    pub label: String,

    /// Data type (Char or Num).
    pub data_type: VariableType,

    /// Maximum byte length for character variables.
    #[serde(default)]
    pub length: Option<u32>,

    /// Core designation: Required, Expected, or Permissible.
    pub core: CoreDesignation,

    /// Governing codelist code, when controlled.
    #[serde(default)]
    pub codelist_code: Option<String>,

    /// CDISC notes from the implementation guide.
    #[serde(default)]
    pub cdisc_notes: Option<String>,
}

/// An SDTM domain definition from the implementation guide.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainSpec {
    /// Domain code, 2-8 characters (e.g., "DM", "SUPPQUAL").
    pub domain: String,

    /// Human-readable label (e.g., "Demographics").
    pub label: String,

    /// Dataset class.
    pub class: DatasetClass,

    /// Dataset structure description (e.g., "One record per subject").
    pub structure: String,

    /// Ordered key variables; defines the dataset sort order.
    pub key_variables: Vec<String>,

    /// Variables in implementation-guide order.
    pub variables: Vec<VariableSpec>,
}

impl DomainSpec {
    /// Look up a variable by name (case-insensitive).
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables
            .iter()
            .find(|v| v.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Names of the Required variables, in order.
    pub fn required_variables(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|v| v.core.is_required())
            .map(|v| v.name.as_str())
            .collect()
    }

    /// Names of the Expected variables, in order.
    pub fn expected_variables(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|v| matches!(v.core, CoreDesignation::Expected))
            .map(|v| v.name.as_str())
            .collect()
    }

    /// All variable names, in implementation-guide order.
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.iter().map(|v| v.name.as_str()).collect()
    }

    /// Variable names excluding the identifiers common to every domain
    /// (STUDYID, DOMAIN, USUBJID). Used by classification overlap scoring.
    pub fn distinctive_variable_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .map(|v| v.name.as_str())
            .filter(|n| !matches!(*n, "STUDYID" | "DOMAIN" | "USUBJID"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dm_spec() -> DomainSpec {
        DomainSpec {
            domain: "DM".to_string(),
            label: "Demographics".to_string(),
            class: DatasetClass::SpecialPurpose,
            structure: "One record per subject".to_string(),
            key_variables: vec!["STUDYID".to_string(), "USUBJID".to_string()],
            variables: vec![
                VariableSpec {
                    order: 1,
                    name: "STUDYID".to_string(),
                    label: "Study Identifier".to_string(),
                    data_type: VariableType::Char,
                    length: Some(20),
                    core: CoreDesignation::Required,
                    codelist_code: None,
                    cdisc_notes: None,
                },
                VariableSpec {
                    order: 2,
                    name: "SEX".to_string(),
                    label: "Sex".to_string(),
                    data_type: VariableType::Char,
                    length: Some(2),
                    core: CoreDesignation::Required,
                    codelist_code: Some("C66731".to_string()),
                    cdisc_notes: None,
                },
                VariableSpec {
                    order: 3,
                    name: "AGE".to_string(),
                    label: "Age".to_string(),
                    data_type: VariableType::Num,
                    length: None,
                    core: CoreDesignation::Expected,
                    codelist_code: None,
                    cdisc_notes: None,
                },
            ],
        }
    }

    #[test]
    fn required_and_expected() {
        let spec = dm_spec();
        assert_eq!(spec.required_variables(), vec!["STUDYID", "SEX"]);
        assert_eq!(spec.expected_variables(), vec!["AGE"]);
    }

    #[test]
    fn distinctive_excludes_common_identifiers() {
        let spec = dm_spec();
        assert_eq!(spec.distinctive_variable_names(), vec!["SEX", "AGE"]);
    }

    #[test]
    fn variable_lookup_is_case_insensitive() {
        let spec = dm_spec();
        assert!(spec.variable("sex").is_some());
        assert!(spec.variable("AEDECOD").is_none());
    }
}
