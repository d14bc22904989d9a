//! Cross-study template library.

use chrono::Utc;
use tracing::info;

use astraea_model::{DomainMappingSpec, DomainTemplate};

use crate::error::LearnError;
use crate::store::LearningStore;

/// Fold an approved spec into the domain's canonical template.
///
/// New domains create a template; existing ones merge variable rules and
/// fold the observed accuracy into the weighted average, where the weight
/// is the number of prior contributing studies.
pub fn update_template(
    store: &mut LearningStore,
    spec: &DomainMappingSpec,
    study_id: &str,
    observed_accuracy: f64,
) -> Result<DomainTemplate, LearnError> {
    let mut template = store.template(&spec.domain)?.unwrap_or(DomainTemplate {
        domain: spec.domain.to_uppercase(),
        source_study_ids: Vec::new(),
        variable_rules: Default::default(),
        accuracy: observed_accuracy,
        updated_at: Utc::now(),
    });

    let is_new_study = !template.source_study_ids.iter().any(|s| s == study_id);
    if is_new_study {
        template.source_study_ids.push(study_id.to_string());
        if template.source_study_ids.len() > 1 {
            template.update_accuracy(observed_accuracy);
        } else {
            template.accuracy = observed_accuracy;
        }
    }

    for mapping in spec.variable_mappings.values() {
        let sketch = mapping
            .derivation_rule
            .clone()
            .or_else(|| mapping.source_variable.clone())
            .unwrap_or_else(|| mapping.pattern.to_string());
        template
            .variable_rules
            .entry(mapping.sdtm_variable.to_uppercase())
            .or_insert(sketch);
    }
    template.updated_at = Utc::now();

    store.save_template(&template)?;
    info!(
        domain = %template.domain,
        studies = template.source_study_ids.len(),
        accuracy = template.accuracy,
        "domain template updated"
    );
    Ok(template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{
        ConfidenceLevel, DatasetClass, MappingPattern, VariableMapping,
    };
    use std::collections::{BTreeMap, BTreeSet};

    fn spec() -> DomainMappingSpec {
        let mut spec = DomainMappingSpec {
            domain: "DM".to_string(),
            domain_class: DatasetClass::SpecialPurpose,
            structure: String::new(),
            source_datasets: BTreeSet::new(),
            variable_mappings: BTreeMap::new(),
            total_variables: 0,
            required_mapped: 0,
            missing_required_variables: Vec::new(),
            predict_prevent_issues: Vec::new(),
            sort_order: Vec::new(),
            suppqual_candidates: Vec::new(),
        };
        spec.insert(VariableMapping {
            sdtm_variable: "USUBJID".to_string(),
            pattern: MappingPattern::Derivation,
            source_dataset: None,
            source_variable: None,
            derivation_rule: Some("GENERATE_USUBJID".to_string()),
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
            origin: None,
            computational_method: None,
        });
        spec
    }

    #[test]
    fn weighted_average_across_studies() {
        let mut store = LearningStore::open_in_memory().unwrap();

        let first = update_template(&mut store, &spec(), "STUDY-A", 0.8).unwrap();
        assert_eq!(first.accuracy, 0.8);
        assert_eq!(
            first.variable_rules.get("USUBJID").map(String::as_str),
            Some("GENERATE_USUBJID")
        );

        // Second study with accuracy 0.6: (1*0.8 + 0.6) / 2 = 0.7.
        let second = update_template(&mut store, &spec(), "STUDY-B", 0.6).unwrap();
        assert!((second.accuracy - 0.7).abs() < 1e-9);
        assert_eq!(second.source_study_ids.len(), 2);

        // Re-ingesting the same study does not shift the average.
        let third = update_template(&mut store, &spec(), "STUDY-B", 0.0).unwrap();
        assert!((third.accuracy - 0.7).abs() < 1e-9);
    }
}
