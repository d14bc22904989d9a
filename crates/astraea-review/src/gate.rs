//! The interactive review gate.
//!
//! Variables are presented grouped by confidence: the HIGH group can be
//! batch-accepted, MEDIUM and LOW go one at a time. The pure
//! [`apply_decisions`] function turns a spec plus recorded decisions into
//! the approved spec, so the interactive layer stays thin and the logic
//! stays testable.

use chrono::Utc;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use tracing::info;

use astraea_model::{
    ConfidenceLevel, CorrectionType, DomainMappingSpec, HumanCorrection, ReviewDecision,
    ReviewStatus, VariableMapping,
};

use crate::error::ReviewError;
use crate::session::SessionStore;

/// What a completed domain review produced.
pub struct ReviewOutcome {
    /// The spec after applying every decision.
    pub approved_spec: DomainMappingSpec,

    /// The decisions, in presentation order.
    pub decisions: Vec<ReviewDecision>,
}

/// Apply recorded decisions to a proposed spec.
///
/// ACCEPT keeps the proposal, MODIFY swaps in the corrected mapping,
/// REJECT removes the target, ADD inserts a reviewer-authored mapping.
pub fn apply_decisions(
    spec: &DomainMappingSpec,
    decisions: &[ReviewDecision],
) -> DomainMappingSpec {
    let mut approved = spec.clone();
    for decision in decisions {
        match decision.correction.correction_type {
            CorrectionType::Accept => {}
            CorrectionType::Modify => {
                if let Some(corrected) = &decision.correction.corrected_mapping {
                    approved.insert(corrected.clone());
                }
            }
            CorrectionType::Reject => {
                approved.remove(&decision.sdtm_variable);
            }
            CorrectionType::Add => {
                approved.insert(decision.correction.original_mapping.clone());
            }
        }
    }
    approved
}

/// Run the interactive review for one domain, persisting each decision
/// the moment it is made.
pub fn review_domain_interactive(
    store: &mut SessionStore,
    session_id: &str,
    spec: &DomainMappingSpec,
) -> Result<ReviewOutcome, ReviewError> {
    let theme = ColorfulTheme::default();
    let mut decisions: Vec<ReviewDecision> = Vec::new();

    // Skip variables already decided in a previous (interrupted) run.
    let already_decided: Vec<String> = store
        .load_session(session_id)
        .map(|session| {
            session
                .domain_reviews
                .get(&spec.domain.to_uppercase())
                .map(|review| review.decisions.keys().cloned().collect())
                .unwrap_or_default()
        })
        .unwrap_or_default();

    let pending: Vec<&VariableMapping> = spec
        .ordered_mappings()
        .into_iter()
        .filter(|m| !already_decided.contains(&m.sdtm_variable.to_uppercase()))
        .collect();

    println!(
        "Reviewing {}: {} variable(s), {} already decided",
        spec.domain,
        pending.len(),
        already_decided.len()
    );
    if !spec.predict_prevent_issues.is_empty() {
        println!("Pre-execution findings:");
        for issue in &spec.predict_prevent_issues {
            println!("  [{}] {} {}", issue.severity, issue.rule_id, issue.message);
        }
    }

    // HIGH-confidence block: offer batch acceptance.
    let high: Vec<&VariableMapping> = pending
        .iter()
        .copied()
        .filter(|m| m.confidence_level == ConfidenceLevel::High)
        .collect();
    let batch_accept_high = !high.is_empty() && {
        println!("{} high-confidence mapping(s):", high.len());
        for mapping in &high {
            println!("  {}", describe(mapping));
        }
        Confirm::with_theme(&theme)
            .with_prompt("Accept all high-confidence mappings?")
            .default(true)
            .interact()?
    };

    let mut index = already_decided.len() as u32;
    for mapping in pending {
        index += 1;
        let decision = if batch_accept_high && mapping.confidence_level == ConfidenceLevel::High
        {
            make_decision(mapping, index, CorrectionType::Accept, None, None)
        } else {
            prompt_single(&theme, mapping, index)?
        };

        store.record_decision(session_id, &spec.domain, &decision)?;
        decisions.push(decision);
    }

    store.set_domain_status(session_id, &spec.domain, ReviewStatus::Completed)?;
    let approved_spec = apply_decisions(spec, &decisions);
    info!(
        domain = %spec.domain,
        decisions = decisions.len(),
        "domain review completed"
    );

    Ok(ReviewOutcome {
        approved_spec,
        decisions,
    })
}

fn prompt_single(
    theme: &ColorfulTheme,
    mapping: &VariableMapping,
    index: u32,
) -> Result<ReviewDecision, ReviewError> {
    println!("\n{}", describe(mapping));
    if !mapping.confidence_rationale.is_empty() {
        println!("  rationale: {}", mapping.confidence_rationale);
    }

    let choice = Select::with_theme(theme)
        .with_prompt(format!("{} decision", mapping.sdtm_variable))
        .items(&["Accept", "Modify source", "Reject"])
        .default(0)
        .interact()?;

    match choice {
        1 => {
            let source: String = Input::with_theme(theme)
                .with_prompt("Corrected source column")
                .interact_text()?;
            let rule: String = Input::with_theme(theme)
                .with_prompt("Corrected derivation rule (blank to keep)")
                .allow_empty(true)
                .interact_text()?;
            let reason: String = Input::with_theme(theme)
                .with_prompt("Reason")
                .allow_empty(true)
                .interact_text()?;

            let mut corrected = mapping.clone();
            corrected.source_variable = Some(source);
            if !rule.trim().is_empty() {
                corrected.derivation_rule = Some(rule.trim().to_string());
            }
            Ok(make_decision(
                mapping,
                index,
                CorrectionType::Modify,
                Some(corrected),
                (!reason.is_empty()).then_some(reason),
            ))
        }
        2 => {
            let reason: String = Input::with_theme(theme)
                .with_prompt("Reason for rejection")
                .allow_empty(true)
                .interact_text()?;
            Ok(make_decision(
                mapping,
                index,
                CorrectionType::Reject,
                None,
                (!reason.is_empty()).then_some(reason),
            ))
        }
        _ => Ok(make_decision(mapping, index, CorrectionType::Accept, None, None)),
    }
}

fn make_decision(
    mapping: &VariableMapping,
    index: u32,
    correction_type: CorrectionType,
    corrected: Option<VariableMapping>,
    reason: Option<String>,
) -> ReviewDecision {
    ReviewDecision {
        sdtm_variable: mapping.sdtm_variable.clone(),
        correction: HumanCorrection {
            variable_index: index,
            correction_type,
            original_mapping: mapping.clone(),
            corrected_mapping: corrected,
            reason,
            timestamp: Utc::now(),
        },
    }
}

fn describe(mapping: &VariableMapping) -> String {
    let source = match (&mapping.source_dataset, &mapping.source_variable) {
        (Some(ds), Some(var)) => format!("{ds}.{var}"),
        (None, Some(var)) => var.clone(),
        _ => "-".to_string(),
    };
    let rule = mapping.derivation_rule.as_deref().unwrap_or("-");
    format!(
        "{:<10} {:<14} source={source} rule={rule} ({}, {:.2})",
        mapping.sdtm_variable,
        mapping.pattern,
        mapping.confidence_level,
        mapping.confidence_score,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{DatasetClass, MappingPattern};
    use std::collections::{BTreeMap, BTreeSet};

    fn mapping(var: &str) -> VariableMapping {
        VariableMapping {
            sdtm_variable: var.to_string(),
            pattern: MappingPattern::Direct,
            source_dataset: Some("dm".to_string()),
            source_variable: Some(var.to_string()),
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
            origin: None,
            computational_method: None,
        }
    }

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
        spec.insert(mapping("SEX"));
        spec.insert(mapping("AGE"));
        spec
    }

    fn decision(var: &str, kind: CorrectionType, corrected: Option<VariableMapping>) -> ReviewDecision {
        ReviewDecision {
            sdtm_variable: var.to_string(),
            correction: HumanCorrection {
                variable_index: 1,
                correction_type: kind,
                original_mapping: mapping(var),
                corrected_mapping: corrected,
                reason: None,
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn reject_removes_and_modify_replaces() {
        let spec = spec();
        let mut corrected = mapping("SEX");
        corrected.source_variable = Some("GENDER".to_string());

        let approved = apply_decisions(
            &spec,
            &[
                decision("SEX", CorrectionType::Modify, Some(corrected)),
                decision("AGE", CorrectionType::Reject, None),
            ],
        );

        assert_eq!(
            approved
                .mapping("SEX")
                .unwrap()
                .source_variable
                .as_deref(),
            Some("GENDER")
        );
        assert!(approved.mapping("AGE").is_none());
    }

    #[test]
    fn add_inserts_new_target() {
        let spec = spec();
        let approved = apply_decisions(
            &spec,
            &[decision("ETHNIC", CorrectionType::Add, None)],
        );
        assert!(approved.mapping("ETHNIC").is_some());
    }
}
