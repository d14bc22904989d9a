//! Predict-and-prevent: spec-level validation before execution.
//!
//! These checks need only the mapping spec and the reference store, so
//! problems surface during human review instead of at execution time.
//! Findings attach to the spec; they inform the reviewer but never block.

use astraea_model::{DomainMappingSpec, MappingPattern, Severity, SpecIssue};
use astraea_standards::ReferenceStore;

use crate::rules::DerivationRule;

/// Run every predict-and-prevent rule and attach the findings to the spec.
pub fn predict_and_prevent(spec: &mut DomainMappingSpec, store: &ReferenceStore) {
    let mut issues = Vec::new();

    check_required_mapped(spec, store, &mut issues);
    check_duplicate_targets(spec, &mut issues);
    check_codelists_exist(spec, store, &mut issues);
    check_assign_values(spec, store, &mut issues);
    check_variables_in_domain(spec, store, &mut issues);
    check_origin_present(spec, &mut issues);
    check_derivation_methods(spec, &mut issues);
    check_rule_vocabulary(spec, &mut issues);

    spec.predict_prevent_issues = issues;
}

/// ASTR-PP001: every Required reference variable has a mapping.
fn check_required_mapped(
    spec: &DomainMappingSpec,
    store: &ReferenceStore,
    issues: &mut Vec<SpecIssue>,
) {
    let Ok(required) = store.get_required_variables(&spec.domain) else {
        return;
    };
    for name in required {
        if spec.mapping(name).is_none() {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP001".to_string(),
                severity: Severity::Error,
                variable: Some(name.to_string()),
                message: format!("Required variable {name} has no mapping"),
            });
        }
    }
}

/// ASTR-PP002: no two mappings target the same SDTM variable.
///
/// The spec's index makes duplicates impossible once constructed; this
/// check guards specs deserialized from edited JSON, where a mapping's
/// declared target can disagree with its index key.
fn check_duplicate_targets(spec: &DomainMappingSpec, issues: &mut Vec<SpecIssue>) {
    for (key, mapping) in &spec.variable_mappings {
        let declared = mapping.sdtm_variable.to_uppercase();
        if *key != declared {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP002".to_string(),
                severity: Severity::Error,
                variable: Some(mapping.sdtm_variable.clone()),
                message: format!(
                    "Mapping indexed as {key} declares target {declared}; targets must be unique"
                ),
            });
        }
    }
}

/// ASTR-PP003: every referenced codelist code exists in CT.
fn check_codelists_exist(
    spec: &DomainMappingSpec,
    store: &ReferenceStore,
    issues: &mut Vec<SpecIssue>,
) {
    for mapping in spec.variable_mappings.values() {
        if let Some(code) = mapping.codelist_code.as_deref()
            && store.lookup_codelist(code).is_none()
        {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP003".to_string(),
                severity: Severity::Warning,
                variable: Some(mapping.sdtm_variable.clone()),
                message: format!("Codelist {code} is not in the bundled CT release"),
            });
        }
    }
}

/// ASTR-PP004: ASSIGN values on non-extensible codelists are valid terms.
fn check_assign_values(
    spec: &DomainMappingSpec,
    store: &ReferenceStore,
    issues: &mut Vec<SpecIssue>,
) {
    for mapping in spec.variable_mappings.values() {
        if mapping.pattern != MappingPattern::Assign {
            continue;
        }
        let Some(value) = mapping.derivation_rule.as_deref() else {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP004".to_string(),
                severity: Severity::Error,
                variable: Some(mapping.sdtm_variable.clone()),
                message: "ASSIGN mapping has no constant value".to_string(),
            });
            continue;
        };
        if let Some(code) = mapping.codelist_code.as_deref()
            && let Some(codelist) = store.lookup_codelist(code)
            && !codelist.extensible
            && !codelist.contains(value)
        {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP004".to_string(),
                severity: Severity::Error,
                variable: Some(mapping.sdtm_variable.clone()),
                message: format!(
                    "Assigned value {value:?} is not a submission value of non-extensible {code}"
                ),
            });
        }
    }
}

/// ASTR-PP005: every target exists in the domain (else SUPPQUAL candidate).
fn check_variables_in_domain(
    spec: &DomainMappingSpec,
    store: &ReferenceStore,
    issues: &mut Vec<SpecIssue>,
) {
    let Ok(domain_spec) = store.get_domain_spec(&spec.domain) else {
        return;
    };
    for mapping in spec.variable_mappings.values() {
        if domain_spec.variable(&mapping.sdtm_variable).is_none() {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP005".to_string(),
                severity: Severity::Warning,
                variable: Some(mapping.sdtm_variable.clone()),
                message: format!(
                    "{} is not an SDTM-IG {} variable; it will move to SUPP{}",
                    mapping.sdtm_variable, spec.domain, spec.domain
                ),
            });
        }
    }
}

/// ASTR-PP006: every mapping carries an origin.
fn check_origin_present(spec: &DomainMappingSpec, issues: &mut Vec<SpecIssue>) {
    for mapping in spec.variable_mappings.values() {
        if mapping.origin.is_none() {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP006".to_string(),
                severity: Severity::Notice,
                variable: Some(mapping.sdtm_variable.clone()),
                message: "Mapping has no origin; define.xml needs one".to_string(),
            });
        }
    }
}

/// ASTR-PP007: DERIVATION mappings carry a computational method.
fn check_derivation_methods(spec: &DomainMappingSpec, issues: &mut Vec<SpecIssue>) {
    for mapping in spec.variable_mappings.values() {
        if mapping.pattern == MappingPattern::Derivation
            && mapping
                .computational_method
                .as_deref()
                .is_none_or(|m| m.trim().is_empty())
        {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP007".to_string(),
                severity: Severity::Notice,
                variable: Some(mapping.sdtm_variable.clone()),
                message: "Derived variable has no computational method text".to_string(),
            });
        }
    }
}

/// Unknown derivation keywords are flagged here as errors so the executor
/// never sees them unannounced.
fn check_rule_vocabulary(spec: &DomainMappingSpec, issues: &mut Vec<SpecIssue>) {
    for mapping in spec.variable_mappings.values() {
        let uses_rule = matches!(
            mapping.pattern,
            MappingPattern::Reformat | MappingPattern::Derivation | MappingPattern::Combine
        );
        if !uses_rule {
            continue;
        }
        let Some(rule) = mapping.derivation_rule.as_deref() else {
            continue;
        };
        if let Err(err) = DerivationRule::parse(rule, mapping.source_variable.as_deref()) {
            issues.push(SpecIssue {
                rule_id: "ASTR-PP008".to_string(),
                severity: Severity::Error,
                variable: Some(mapping.sdtm_variable.clone()),
                message: format!("Derivation rule {rule:?} rejected: {err}"),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{
        ConfidenceLevel, DatasetClass, Origin, VariableMapping,
    };
    use astraea_standards::ReferenceStore;
    use std::collections::{BTreeMap, BTreeSet};

    fn base_spec() -> DomainMappingSpec {
        DomainMappingSpec {
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
        }
    }

    fn mapping(var: &str, pattern: MappingPattern) -> VariableMapping {
        VariableMapping {
            sdtm_variable: var.to_string(),
            pattern,
            source_dataset: None,
            source_variable: None,
            derivation_rule: None,
            confidence_level: ConfidenceLevel::High,
            confidence_score: 0.9,
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

    fn ids(spec: &DomainMappingSpec) -> Vec<&str> {
        spec.predict_prevent_issues
            .iter()
            .map(|i| i.rule_id.as_str())
            .collect()
    }

    #[test]
    fn missing_required_is_pp001() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        predict_and_prevent(&mut spec, &store);
        assert!(ids(&spec).contains(&"ASTR-PP001"));
    }

    #[test]
    fn assign_against_non_extensible_codelist_is_pp004() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        let mut m = mapping("SEX", MappingPattern::Assign);
        m.derivation_rule = Some("MALE-ISH".to_string());
        m.codelist_code = Some("C66731".to_string());
        spec.insert(m);
        predict_and_prevent(&mut spec, &store);
        assert!(ids(&spec).contains(&"ASTR-PP004"));
    }

    #[test]
    fn assign_without_codelist_is_not_penalized() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        let mut m = mapping("STUDYID", MappingPattern::Assign);
        m.derivation_rule = Some("STUDY01".to_string());
        spec.insert(m);
        predict_and_prevent(&mut spec, &store);
        assert!(!ids(&spec).contains(&"ASTR-PP004"));
    }

    #[test]
    fn non_domain_variable_is_pp005() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        spec.insert(mapping("RACEOTH", MappingPattern::Direct));
        predict_and_prevent(&mut spec, &store);
        assert!(ids(&spec).contains(&"ASTR-PP005"));
    }

    #[test]
    fn missing_origin_is_pp006() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        let mut m = mapping("SEX", MappingPattern::Direct);
        m.origin = None;
        spec.insert(m);
        predict_and_prevent(&mut spec, &store);
        assert!(ids(&spec).contains(&"ASTR-PP006"));
    }

    #[test]
    fn derivation_without_method_is_pp007() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        let mut m = mapping("USUBJID", MappingPattern::Derivation);
        m.derivation_rule = Some("GENERATE_USUBJID".to_string());
        spec.insert(m);
        predict_and_prevent(&mut spec, &store);
        assert!(ids(&spec).contains(&"ASTR-PP007"));
    }

    #[test]
    fn unknown_keyword_is_an_error() {
        let store = ReferenceStore::load().unwrap();
        let mut spec = base_spec();
        let mut m = mapping("BRTHDTC", MappingPattern::Derivation);
        m.derivation_rule = Some("INVENT_DATE(BRTHDAT)".to_string());
        m.computational_method = Some("made up".to_string());
        spec.insert(m);
        predict_and_prevent(&mut spec, &store);
        let issue = spec
            .predict_prevent_issues
            .iter()
            .find(|i| i.rule_id == "ASTR-PP008")
            .unwrap();
        assert_eq!(issue.severity, Severity::Error);
    }
}
