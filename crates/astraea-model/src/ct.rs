//! Controlled Terminology model.
//!
//! A CT release is a catalog of codelists. Each codelist carries the terms
//! that are permissible dataset values for the variables it governs.
//!
//! Validation semantics:
//! - **Extensible = No**: a value outside the term set is an error.
//! - **Extensible = Yes**: a value outside the term set is a warning only.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A single term within a codelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Term {
    /// The permissible value in datasets (e.g., "M" for Male).
    pub submission_value: String,

    /// NCI preferred term (e.g., "Male").
    #[serde(default)]
    pub nci_preferred_term: Option<String>,

    /// Definition text from the CT release.
    #[serde(default)]
    pub definition: Option<String>,
}

/// A codelist with its terms, keyed by uppercase submission value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Codelist {
    /// NCI code for this codelist (e.g., "C66731" for Sex).
    pub code: String,

    /// Human-readable name (e.g., "Sex").
    pub name: String,

    /// Whether sponsors may submit values outside the term set.
    pub extensible: bool,

    /// SDTM variable names governed by this codelist (e.g., {"SEX"}).
    #[serde(default)]
    pub variable_mappings: BTreeSet<String>,

    /// Terms keyed by uppercase submission value.
    pub terms: BTreeMap<String, Term>,
}

impl Codelist {
    /// Create an empty codelist.
    pub fn new(code: impl Into<String>, name: impl Into<String>, extensible: bool) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            extensible,
            variable_mappings: BTreeSet::new(),
            terms: BTreeMap::new(),
        }
    }

    /// Add a term, keyed by its uppercase submission value.
    pub fn add_term(&mut self, term: Term) {
        self.terms.insert(term.submission_value.to_uppercase(), term);
    }

    /// All submission values in deterministic order.
    pub fn submission_values(&self) -> Vec<&str> {
        self.terms
            .values()
            .map(|t| t.submission_value.as_str())
            .collect()
    }

    /// Whether a value is a listed submission value. Submission values are
    /// case-sensitive: "m" is not a valid Sex value even though "M" is.
    pub fn contains(&self, value: &str) -> bool {
        self.terms
            .get(&value.trim().to_uppercase())
            .is_some_and(|t| t.submission_value == value.trim())
    }

    /// Whether a value is acceptable for this codelist: always true for
    /// extensible codelists, exact term membership otherwise.
    pub fn accepts(&self, value: &str) -> bool {
        self.extensible || self.contains(value)
    }

    /// Resolve a value to its canonical submission value.
    ///
    /// Matches both submission values and NCI preferred terms, so "Male"
    /// resolves to "M". Unknown values return None.
    pub fn resolve(&self, value: &str) -> Option<&str> {
        let key = value.trim().to_uppercase();
        if let Some(term) = self.terms.get(&key) {
            return Some(term.submission_value.as_str());
        }
        self.terms
            .values()
            .find(|t| {
                t.nci_preferred_term
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(value.trim()))
            })
            .map(|t| t.submission_value.as_str())
    }
}

/// A loaded CT release: codelists keyed by uppercase NCI code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtCatalog {
    /// Release version (e.g., "2024-03-29").
    pub version: String,

    /// Codelists by uppercase NCI code.
    pub codelists: BTreeMap<String, Codelist>,
}

impl CtCatalog {
    /// Get a codelist by NCI code.
    pub fn get(&self, code: &str) -> Option<&Codelist> {
        self.codelists.get(&code.trim().to_uppercase())
    }

    /// Add a codelist.
    pub fn add(&mut self, codelist: Codelist) {
        self.codelists.insert(codelist.code.to_uppercase(), codelist);
    }

    /// Build the reverse index from governed variable name to codelist code.
    pub fn variable_index(&self) -> BTreeMap<String, String> {
        let mut index = BTreeMap::new();
        for codelist in self.codelists.values() {
            for var in &codelist.variable_mappings {
                index.insert(var.to_uppercase(), codelist.code.clone());
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sex_codelist() -> Codelist {
        let mut cl = Codelist::new("C66731", "Sex", false);
        cl.add_term(Term {
            submission_value: "M".to_string(),
            nci_preferred_term: Some("Male".to_string()),
            definition: None,
        });
        cl.add_term(Term {
            submission_value: "F".to_string(),
            nci_preferred_term: Some("Female".to_string()),
            definition: None,
        });
        cl
    }

    #[test]
    fn non_extensible_rejects_unknown_and_wrong_case() {
        let cl = sex_codelist();
        assert!(cl.accepts("M"));
        assert!(!cl.accepts("m"));
        assert!(!cl.accepts("X"));
    }

    #[test]
    fn extensible_accepts_anything() {
        let mut cl = sex_codelist();
        cl.extensible = true;
        assert!(cl.accepts("X"));
    }

    #[test]
    fn resolve_matches_preferred_term() {
        let cl = sex_codelist();
        assert_eq!(cl.resolve("Male"), Some("M"));
        assert_eq!(cl.resolve("f"), Some("F"));
        assert_eq!(cl.resolve("Unknown"), None);
    }
}
