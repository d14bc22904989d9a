//! Stage 2: LLM fusion and the confidence adjustment policy.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{info, warn};

use astraea_agent::{CompletionRequest, LanguageModel, strip_code_fence};
use astraea_model::classify::UNCLASSIFIED;
use astraea_model::{
    DatasetProfile, DomainClassification, DomainPlan, EcrfForm, MappingPatternKind,
};
use astraea_standards::ReferenceStore;

use crate::error::ClassifyError;
use crate::heuristics::HeuristicScores;

/// Heuristic score at which the heuristic overrides a disagreeing model.
const OVERRIDE_THRESHOLD: f64 = 0.95;

/// Heuristic score at which agreement boosts / disagreement penalizes.
const STRONG_HEURISTIC: f64 = 0.8;

/// Boost applied when model and a strong heuristic agree.
const AGREEMENT_BOOST: f64 = 0.1;

/// Multiplier applied when the model disagrees with a strong heuristic.
const DISAGREEMENT_PENALTY: f64 = 0.7;

/// Confidence floor below which the dataset stays unclassified.
const UNCLASSIFIED_FLOOR: f64 = 0.3;

/// Domains that always execute as wide-to-tall transposes, independent of
/// what the reference class says.
const FINDINGS_DOMAINS: &[&str] = &["LB", "VS", "EG", "PE", "QS", "SC", "FA"];

#[derive(Debug, Deserialize)]
struct FusionJson {
    primary_domain: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    merge_candidates: Vec<String>,
    #[serde(default)]
    secondary_domains: Vec<String>,
}

/// The classification agent: heuristics in, fused classification out.
pub struct ClassifierAgent<'a, M: LanguageModel + ?Sized> {
    model: &'a M,
}

impl<'a, M: LanguageModel + ?Sized> ClassifierAgent<'a, M> {
    /// Create a classifier over a model.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Classify one dataset.
    pub fn classify(
        &self,
        profile: &DatasetProfile,
        heuristics: &HeuristicScores,
        ecrf_form: Option<&EcrfForm>,
        available_domains: &[&str],
    ) -> Result<DomainClassification, ClassifyError> {
        let request = CompletionRequest::new(
            system_prompt(),
            build_prompt(profile, heuristics, ecrf_form, available_domains),
        );
        let output = self.model.complete(&request)?;
        let fused: FusionJson = serde_json::from_str(strip_code_fence(&output))
            .map_err(|e| ClassifyError::MalformedOutput(e.to_string()))?;

        Ok(apply_policy(profile, heuristics, fused))
    }
}

/// Apply the exact confidence adjustment policy to the model's answer.
fn apply_policy(
    profile: &DatasetProfile,
    heuristics: &HeuristicScores,
    fused: FusionJson,
) -> DomainClassification {
    let llm_domain = fused.primary_domain.trim().to_uppercase();
    let mut domain = llm_domain.clone();
    let mut confidence = fused.confidence.clamp(0.0, 1.0);
    let mut reasoning = fused.reasoning;

    if let Some((top_domain, top_score)) = heuristics.top() {
        let agrees = top_domain.eq_ignore_ascii_case(&llm_domain);
        if top_score >= OVERRIDE_THRESHOLD && !agrees {
            warn!(
                dataset = %profile.dataset_name,
                heuristic = top_domain,
                model = %llm_domain,
                score = top_score,
                "heuristic override of model classification"
            );
            reasoning = format!(
                "Heuristic override: filename/variable evidence for {top_domain} \
                 (score {top_score:.2}) outweighs model choice {llm_domain}. {reasoning}"
            );
            domain = top_domain.to_string();
            confidence = top_score;
        } else if agrees && top_score >= STRONG_HEURISTIC {
            confidence = (confidence + AGREEMENT_BOOST).min(1.0);
        } else if !agrees && top_score >= STRONG_HEURISTIC {
            confidence *= DISAGREEMENT_PENALTY;
        }
    }

    if confidence < UNCLASSIFIED_FLOOR || domain.is_empty() {
        domain = UNCLASSIFIED.to_string();
    }

    info!(
        dataset = %profile.dataset_name,
        domain = %domain,
        confidence,
        "dataset classified"
    );

    DomainClassification {
        dataset_name: profile.dataset_name.clone(),
        primary_domain: domain,
        secondary_domains: fused.secondary_domains,
        merge_candidates: fused.merge_candidates,
        confidence,
        reasoning,
        heuristic_scores: heuristics.scores.clone(),
    }
}

fn system_prompt() -> String {
    "You assign raw clinical datasets to CDISC SDTM domains. Respond with a \
     single JSON object: {\"primary_domain\": \"<code or UNCLASSIFIED>\", \
     \"confidence\": <0..1>, \"reasoning\": ..., \"merge_candidates\": [...], \
     \"secondary_domains\": [...]}. Choose only from the provided domain list."
        .to_string()
}

fn build_prompt(
    profile: &DatasetProfile,
    heuristics: &HeuristicScores,
    ecrf_form: Option<&EcrfForm>,
    available_domains: &[&str],
) -> String {
    let mut prompt = format!(
        "Dataset: {} ({} rows)\nClinical variables: {}\n",
        profile.dataset_name,
        profile.row_count,
        profile.clinical_columns().join(", "),
    );
    if let Some(form) = ecrf_form {
        prompt.push_str(&format!("Associated eCRF form: {}\n", form.form_name));
    }
    if !heuristics.scores.is_empty() {
        let rendered: Vec<String> = heuristics
            .scores
            .iter()
            .map(|(d, s)| format!("{d}={s:.2}"))
            .collect();
        prompt.push_str(&format!("Heuristic scores: {}\n", rendered.join(", ")));
    }
    prompt.push_str(&format!("Available domains: {}\n", available_domains.join(", ")));
    prompt
}

/// Build execution plans from classifications and merge groups.
///
/// Findings domains plan a transpose; merge groups plan a merge; both at
/// once plan mixed.
pub fn build_domain_plans(
    classifications: &[DomainClassification],
    merge_groups: &BTreeMap<String, Vec<String>>,
    store: &ReferenceStore,
) -> Vec<DomainPlan> {
    let mut by_domain: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for classification in classifications {
        if classification.is_unclassified() {
            continue;
        }
        by_domain
            .entry(classification.primary_domain.clone())
            .or_default()
            .push(classification.dataset_name.clone());
    }

    // Merge-group members that classified to the same domain stack together.
    for members in merge_groups.values() {
        for classification in classifications {
            if members.contains(&classification.dataset_name)
                && !classification.is_unclassified()
                && let Some(sources) = by_domain.get_mut(&classification.primary_domain)
            {
                for member in members {
                    if !sources.contains(member) {
                        sources.push(member.clone());
                    }
                }
            }
        }
    }

    by_domain
        .into_iter()
        .map(|(domain, mut sources)| {
            sources.sort();
            sources.dedup();

            let is_findings = FINDINGS_DOMAINS.contains(&domain.as_str())
                || store
                    .get_domain_spec(&domain)
                    .map(|spec| spec.class.is_findings())
                    .unwrap_or(false);
            let is_merge = sources.len() > 1;

            let mapping_pattern = match (is_findings, is_merge) {
                (true, true) => MappingPatternKind::Mixed,
                (true, false) => MappingPatternKind::Transpose,
                (false, true) => MappingPatternKind::Merge,
                (false, false) => MappingPatternKind::Direct,
            };

            DomainPlan {
                target_domain: domain,
                source_datasets: sources,
                mapping_pattern,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{VariableMetadata, VariableProfile, VariableType};
    use std::collections::BTreeSet;

    fn profile(name: &str) -> DatasetProfile {
        DatasetProfile {
            filename: format!("{name}.csv"),
            dataset_name: name.to_string(),
            row_count: 10,
            col_count: 1,
            variables: vec![VariableProfile {
                metadata: VariableMetadata {
                    name: "AETERM".to_string(),
                    label: None,
                    format: None,
                    dtype: VariableType::Char,
                    width: 20,
                },
                n_missing: 0,
                missing_pct: 0.0,
                n_unique: 5,
                sample_values: Vec::new(),
                top_values: Vec::new(),
                is_date: false,
                detected_date_format: None,
            }],
            edc_columns: BTreeSet::new(),
            date_variables: Vec::new(),
        }
    }

    fn scores(pairs: &[(&str, f64)]) -> HeuristicScores {
        HeuristicScores {
            dataset_name: "ae".to_string(),
            scores: pairs
                .iter()
                .map(|(d, s)| ((*d).to_string(), *s))
                .collect(),
        }
    }

    fn fused(domain: &str, confidence: f64) -> FusionJson {
        FusionJson {
            primary_domain: domain.to_string(),
            confidence,
            reasoning: String::new(),
            merge_candidates: Vec::new(),
            secondary_domains: Vec::new(),
        }
    }

    #[test]
    fn strong_heuristic_overrides_model() {
        let result = apply_policy(&profile("ae"), &scores(&[("AE", 1.0)]), fused("CM", 0.9));
        assert_eq!(result.primary_domain, "AE");
        assert_eq!(result.confidence, 1.0);
        assert!(result.reasoning.starts_with("Heuristic override"));
    }

    #[test]
    fn agreement_boosts_confidence() {
        let result = apply_policy(&profile("ae"), &scores(&[("AE", 0.85)]), fused("AE", 0.7));
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn disagreement_penalizes_confidence() {
        let result = apply_policy(&profile("ae"), &scores(&[("AE", 0.85)]), fused("CM", 0.6));
        assert_eq!(result.primary_domain, "CM");
        assert!((result.confidence - 0.42).abs() < 1e-9);
    }

    #[test]
    fn weak_confidence_is_unclassified() {
        let result = apply_policy(&profile("misc"), &scores(&[]), fused("AE", 0.2));
        assert!(result.is_unclassified());
    }

    #[test]
    fn findings_domain_plans_transpose() {
        let store = ReferenceStore::load().unwrap();
        let classifications = vec![
            DomainClassification {
                dataset_name: "lb_biochem".to_string(),
                primary_domain: "LB".to_string(),
                secondary_domains: Vec::new(),
                merge_candidates: Vec::new(),
                confidence: 0.9,
                reasoning: String::new(),
                heuristic_scores: BTreeMap::new(),
            },
            DomainClassification {
                dataset_name: "dm".to_string(),
                primary_domain: "DM".to_string(),
                secondary_domains: Vec::new(),
                merge_candidates: Vec::new(),
                confidence: 0.95,
                reasoning: String::new(),
                heuristic_scores: BTreeMap::new(),
            },
        ];
        let mut groups = BTreeMap::new();
        groups.insert(
            "lb".to_string(),
            vec!["lb_biochem".to_string(), "lb_hem".to_string()],
        );

        let plans = build_domain_plans(&classifications, &groups, &store);
        let lb = plans.iter().find(|p| p.target_domain == "LB").unwrap();
        assert_eq!(lb.mapping_pattern, MappingPatternKind::Mixed);
        assert_eq!(lb.source_datasets.len(), 2);

        let dm = plans.iter().find(|p| p.target_domain == "DM").unwrap();
        assert_eq!(dm.mapping_pattern, MappingPatternKind::Direct);
    }
}
