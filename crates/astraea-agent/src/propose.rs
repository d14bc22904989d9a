//! The per-domain mapping proposal step.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use tracing::{info, warn};

use astraea_model::{
    ConfidenceLevel, DatasetProfile, DomainMappingSpec, DomainSpec, EcrfForm, MappingPattern,
    Origin, VariableMapping,
};

use crate::error::AgentError;
use crate::llm::{CompletionRequest, LanguageModel, strip_code_fence};
use crate::prompt::{MappingPromptInput, build_mapping_prompt, system_prompt};

/// Everything the agent needs to propose one domain's mappings.
pub struct ProposalContext<'a> {
    /// Study identifier.
    pub study_id: &'a str,

    /// Reference spec of the target domain.
    pub domain_spec: &'a DomainSpec,

    /// Profiles of the source datasets, in plan order.
    pub profiles: Vec<&'a DatasetProfile>,

    /// eCRF forms tied to the source datasets.
    pub ecrf_forms: &'a [EcrfForm],

    /// Rendered few-shot examples from the learning retriever.
    pub examples: &'a [String],
}

/// The agent's raw proposal schema. Enrichment data (labels, order, core)
/// is deliberately absent; it is attached from the reference afterwards.
#[derive(Debug, Deserialize)]
struct ProposalJson {
    #[allow(dead_code)]
    domain: String,
    mappings: Vec<ProposalMappingJson>,
}

#[derive(Debug, Deserialize)]
struct ProposalMappingJson {
    sdtm_variable: String,
    pattern: String,
    #[serde(default)]
    source_dataset: Option<String>,
    #[serde(default)]
    source_variable: Option<String>,
    #[serde(default)]
    derivation_rule: Option<String>,
    confidence: f64,
    #[serde(default)]
    confidence_rationale: String,
    #[serde(default)]
    origin: Option<String>,
    #[serde(default)]
    computational_method: Option<String>,
}

/// The mapping agent: one LLM round per domain.
pub struct MappingAgent<'a, M: LanguageModel + ?Sized> {
    model: &'a M,
}

impl<'a, M: LanguageModel + ?Sized> MappingAgent<'a, M> {
    /// Create an agent over a model.
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    /// Propose a mapping spec for one domain.
    ///
    /// Malformed model output is an error with no retry: resending the
    /// same prompt cannot repair a schema violation, so the failure
    /// surfaces to the operator instead.
    pub fn propose(&self, ctx: &ProposalContext<'_>) -> Result<DomainMappingSpec, AgentError> {
        let prompt = build_mapping_prompt(&MappingPromptInput {
            domain_spec: ctx.domain_spec,
            profiles: &ctx.profiles,
            ecrf_forms: ctx.ecrf_forms,
            examples: ctx.examples,
            study_id: ctx.study_id,
        });

        let request = CompletionRequest::new(system_prompt(), prompt);
        let output = self.model.complete(&request)?;
        let proposal: ProposalJson = serde_json::from_str(strip_code_fence(&output))
            .map_err(|e| AgentError::MalformedOutput(e.to_string()))?;

        let mut spec = DomainMappingSpec {
            domain: ctx.domain_spec.domain.clone(),
            domain_class: ctx.domain_spec.class,
            structure: ctx.domain_spec.structure.clone(),
            source_datasets: BTreeSet::new(),
            variable_mappings: BTreeMap::new(),
            total_variables: ctx.domain_spec.variables.len(),
            required_mapped: 0,
            missing_required_variables: Vec::new(),
            predict_prevent_issues: Vec::new(),
            sort_order: ctx.domain_spec.key_variables.clone(),
            suppqual_candidates: Vec::new(),
        };

        for raw in proposal.mappings {
            let pattern: MappingPattern = raw
                .pattern
                .parse()
                .map_err(AgentError::MalformedOutput)?;
            let origin: Option<Origin> = match raw.origin.as_deref() {
                None => None,
                Some(text) => match text.parse() {
                    Ok(origin) => Some(origin),
                    Err(_) => {
                        warn!(variable = %raw.sdtm_variable, origin = text, "unrecognized origin dropped");
                        None
                    }
                },
            };

            if let Some(dataset) = &raw.source_dataset {
                spec.source_datasets.insert(dataset.to_lowercase());
            }

            let score = raw.confidence.clamp(0.0, 1.0);
            let mapping = VariableMapping {
                sdtm_variable: raw.sdtm_variable.trim().to_uppercase(),
                pattern,
                source_dataset: raw.source_dataset.map(|d| d.to_lowercase()),
                source_variable: raw.source_variable,
                derivation_rule: raw.derivation_rule,
                confidence_level: ConfidenceLevel::from_score(score),
                confidence_score: score,
                confidence_rationale: raw.confidence_rationale,
                order: None,
                length: None,
                label: None,
                data_type: None,
                core: None,
                codelist_code: None,
                codelist_name: None,
                origin,
                computational_method: raw.computational_method,
            };

            if spec.insert(mapping).is_some() {
                warn!(
                    domain = %spec.domain,
                    "duplicate proposal target; keeping the later mapping"
                );
            }
        }

        info!(
            domain = %spec.domain,
            proposed = spec.variable_mappings.len(),
            "mapping proposal received"
        );
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{CoreDesignation, DatasetClass, VariableSpec, VariableType};

    struct CannedModel(String);

    impl LanguageModel for CannedModel {
        fn complete(&self, _request: &CompletionRequest) -> Result<String, AgentError> {
            Ok(self.0.clone())
        }

        fn embed(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![0.0; 8])
        }
    }

    fn dm_spec() -> DomainSpec {
        DomainSpec {
            domain: "DM".to_string(),
            label: "Demographics".to_string(),
            class: DatasetClass::SpecialPurpose,
            structure: "One record per subject".to_string(),
            key_variables: vec!["STUDYID".to_string(), "USUBJID".to_string()],
            variables: vec![VariableSpec {
                order: 1,
                name: "USUBJID".to_string(),
                label: "Unique Subject Identifier".to_string(),
                data_type: VariableType::Char,
                length: Some(40),
                core: CoreDesignation::Required,
                codelist_code: None,
                cdisc_notes: None,
            }],
        }
    }

    #[test]
    fn parses_a_fenced_proposal() {
        let model = CannedModel(
            "```json\n{\"domain\": \"DM\", \"mappings\": [{\
             \"sdtm_variable\": \"usubjid\", \"pattern\": \"DERIVATION\", \
             \"source_dataset\": \"DM\", \"derivation_rule\": \"GENERATE_USUBJID\", \
             \"confidence\": 0.97, \"origin\": \"Derived\"}]}\n```"
                .to_string(),
        );
        let spec = dm_spec();
        let agent = MappingAgent::new(&model);
        let ctx = ProposalContext {
            study_id: "STUDY01",
            domain_spec: &spec,
            profiles: Vec::new(),
            ecrf_forms: &[],
            examples: &[],
        };

        let proposed = agent.propose(&ctx).unwrap();
        let mapping = proposed.mapping("USUBJID").unwrap();
        assert_eq!(mapping.pattern, MappingPattern::Derivation);
        assert_eq!(mapping.confidence_level, ConfidenceLevel::High);
        assert!(proposed.source_datasets.contains("dm"));
    }

    #[test]
    fn malformed_output_is_an_error() {
        let model = CannedModel("the mappings are as follows: ...".to_string());
        let spec = dm_spec();
        let agent = MappingAgent::new(&model);
        let ctx = ProposalContext {
            study_id: "STUDY01",
            domain_spec: &spec,
            profiles: Vec::new(),
            ecrf_forms: &[],
            examples: &[],
        };
        assert!(matches!(
            agent.propose(&ctx),
            Err(AgentError::MalformedOutput(_))
        ));
    }

    #[test]
    fn unknown_pattern_is_malformed_output() {
        let model = CannedModel(
            "{\"domain\": \"DM\", \"mappings\": [{\"sdtm_variable\": \"USUBJID\", \
             \"pattern\": \"GUESSWORK\", \"confidence\": 0.9}]}"
                .to_string(),
        );
        let spec = dm_spec();
        let agent = MappingAgent::new(&model);
        let ctx = ProposalContext {
            study_id: "STUDY01",
            domain_spec: &spec,
            profiles: Vec::new(),
            ecrf_forms: &[],
            examples: &[],
        };
        assert!(matches!(
            agent.propose(&ctx),
            Err(AgentError::MalformedOutput(_))
        ));
    }
}
