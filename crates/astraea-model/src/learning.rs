//! Learning entities: stored examples and cross-study templates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::MappingPattern;

/// A stored mapping example, embeddable for similarity retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningExample {
    /// Deterministic id: `{study_id}_{domain}_{sdtm_variable}`.
    pub example_id: String,

    /// Study the example came from.
    pub study_id: String,

    /// SDTM domain.
    pub domain: String,

    /// Target SDTM variable.
    pub sdtm_variable: String,

    /// Source variable name(s), comma-joined.
    pub source_variable: String,

    /// Mapping pattern used.
    pub pattern: MappingPattern,

    /// Derivation rule, when the pattern carries one.
    #[serde(default)]
    pub derivation_rule: Option<String>,

    /// True when the example records a human MODIFY correction.
    pub was_corrected: bool,

    /// Reviewer's reason, for corrected examples.
    #[serde(default)]
    pub correction_reason: Option<String>,

    /// The text that gets embedded for retrieval.
    pub embedded_text: String,

    /// When the example was stored.
    pub timestamp: DateTime<Utc>,
}

impl LearningExample {
    /// Build the deterministic example id.
    pub fn make_id(study_id: &str, domain: &str, sdtm_variable: &str) -> String {
        format!("{study_id}_{domain}_{sdtm_variable}")
    }

    /// Build the embedding text from the example's identifying fields.
    pub fn embedding_text(
        source_variable: &str,
        sdtm_variable: &str,
        pattern: MappingPattern,
        derivation_rule: Option<&str>,
        domain: &str,
    ) -> String {
        let rule = derivation_rule.unwrap_or("none");
        format!(
            "source {source_variable} maps to {sdtm_variable} in {domain} \
             via {pattern} rule {rule}"
        )
    }
}

/// A cross-study mapping template for one domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTemplate {
    /// SDTM domain.
    pub domain: String,

    /// Studies that contributed to this template.
    pub source_study_ids: Vec<String>,

    /// Canonical variable → rule sketch for the domain.
    pub variable_rules: std::collections::BTreeMap<String, String>,

    /// Weighted-average reviewer-acceptance accuracy in [0, 1].
    pub accuracy: f64,

    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl DomainTemplate {
    /// Fold a new observed accuracy into the weighted average.
    ///
    /// `existing_weight` is the number of prior contributing studies
    /// (`len(source_study_ids) - 1` once the new study is recorded).
    pub fn update_accuracy(&mut self, new_accuracy: f64) {
        let existing_weight = self.source_study_ids.len().saturating_sub(1) as f64;
        self.accuracy =
            (existing_weight * self.accuracy + new_accuracy) / (existing_weight + 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_id() {
        assert_eq!(
            LearningExample::make_id("STUDY01", "DM", "USUBJID"),
            "STUDY01_DM_USUBJID"
        );
    }

    #[test]
    fn weighted_accuracy_update() {
        let mut template = DomainTemplate {
            domain: "DM".to_string(),
            source_study_ids: vec!["A".to_string(), "B".to_string()],
            variable_rules: Default::default(),
            accuracy: 0.8,
            updated_at: Utc::now(),
        };
        // One prior study carries weight 1, so (1*0.8 + 0.6) / 2 = 0.7.
        template.update_accuracy(0.6);
        assert!((template.accuracy - 0.7).abs() < 1e-9);
    }
}
