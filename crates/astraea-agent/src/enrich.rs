//! Reference enrichment of a proposed mapping spec.
//!
//! The proposal deliberately carries no reference metadata; this step
//! attaches it (label, type, length, order, core, codelist) and applies
//! the confidence post-adjustments that depend on the reference and the
//! dataset profiles.

use tracing::debug;

use astraea_model::{
    ConfidenceLevel, DatasetProfile, DomainMappingSpec, MappingPattern, VariableMapping,
};
use astraea_standards::ReferenceStore;

use crate::error::AgentError;

/// Confidence cap when a source value fails a non-extensible codelist.
const CAP_CT_VIOLATION: f64 = 0.40;

/// Confidence cap when the source column is absent from the profile.
const CAP_MISSING_SOURCE: f64 = 0.30;

/// Confidence boost when every source value is covered by the codelist.
const BOOST_FULL_COVERAGE: f64 = 0.05;

/// Enrich a proposed spec in place from the reference store and profiles.
pub fn enrich_spec(
    spec: &mut DomainMappingSpec,
    store: &ReferenceStore,
    profiles: &[&DatasetProfile],
) -> Result<(), AgentError> {
    let domain_spec = store.get_domain_spec(&spec.domain)?;

    let mut suppqual_candidates = Vec::new();
    for mapping in spec.variable_mappings.values_mut() {
        match domain_spec.variable(&mapping.sdtm_variable) {
            Some(var_spec) => {
                mapping.order = Some(var_spec.order);
                mapping.label = Some(var_spec.label.clone());
                mapping.data_type = Some(var_spec.data_type);
                mapping.length = var_spec.length;
                mapping.core = Some(var_spec.core);
                if mapping.codelist_code.is_none() {
                    mapping.codelist_code = var_spec.codelist_code.clone();
                }
            }
            None => {
                suppqual_candidates.push(mapping.sdtm_variable.clone());
            }
        }

        if let Some(code) = &mapping.codelist_code
            && let Some(codelist) = store.lookup_codelist(code)
        {
            mapping.codelist_name = Some(codelist.name.clone());
        }

        adjust_confidence(mapping, store, profiles);
    }

    suppqual_candidates.sort();
    spec.suppqual_candidates = suppqual_candidates;

    let required = domain_spec.required_variables();
    spec.required_mapped = required
        .iter()
        .filter(|name| spec.variable_mappings.contains_key(&name.to_uppercase()))
        .count();
    spec.missing_required_variables = required
        .iter()
        .filter(|name| !spec.variable_mappings.contains_key(&name.to_uppercase()))
        .map(|name| (*name).to_string())
        .collect();
    spec.total_variables = domain_spec.variables.len();
    spec.sort_order = domain_spec.key_variables.clone();

    Ok(())
}

/// Apply the reference-driven confidence adjustments.
///
/// ASSIGN mappings are exempt from codelist penalties: some assigned
/// values use codelists that are not bundled.
fn adjust_confidence(
    mapping: &mut VariableMapping,
    store: &ReferenceStore,
    profiles: &[&DatasetProfile],
) {
    let mut score = mapping.confidence_score;

    if mapping.reads_source() {
        if let Some(source) = mapping.source_variable.as_deref() {
            let found = profiles.iter().any(|p| p.variable(source).is_some());
            if !found && !profiles.is_empty() {
                score = score.min(CAP_MISSING_SOURCE);
                debug!(
                    variable = %mapping.sdtm_variable,
                    source,
                    "source column absent from profile; confidence capped"
                );
            }
        }
    }

    if mapping.pattern == MappingPattern::LookupRecode
        && let Some(code) = mapping.codelist_code.as_deref()
        && let Some(codelist) = store.lookup_codelist(code)
        && let Some(source) = mapping.source_variable.as_deref()
        && let Some(values) = observed_values(source, profiles)
    {
        let misses: Vec<&str> = values
            .iter()
            .map(String::as_str)
            .filter(|v| codelist.resolve(v).is_none())
            .collect();
        if misses.is_empty() {
            score = (score + BOOST_FULL_COVERAGE).min(1.0);
        } else if !codelist.extensible {
            score = score.min(CAP_CT_VIOLATION);
            debug!(
                variable = %mapping.sdtm_variable,
                codelist = code,
                misses = misses.len(),
                "source values outside non-extensible codelist; confidence capped"
            );
        }
    }

    mapping.confidence_score = score;
    mapping.confidence_level = ConfidenceLevel::from_score(score);
}

/// Observed values for a source column, when the profiler captured a full
/// distribution (top values are complete only for low-cardinality columns).
fn observed_values(source: &str, profiles: &[&DatasetProfile]) -> Option<Vec<String>> {
    for profile in profiles {
        if let Some(var) = profile.variable(source) {
            if !var.top_values.is_empty() {
                return Some(var.top_values.iter().map(|(v, _)| v.clone()).collect());
            }
            if !var.sample_values.is_empty() {
                return Some(var.sample_values.clone());
            }
            return None;
        }
    }
    None
}
