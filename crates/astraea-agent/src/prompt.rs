//! Prompt assembly for the mapping agent.

use astraea_model::{DatasetProfile, DomainSpec, EcrfForm};

use crate::rules::VOCABULARY_KEYWORDS;

/// The fixed system prompt: role, output contract, and the closed
/// derivation-rule vocabulary the model must not leave.
pub fn system_prompt() -> String {
    format!(
        "You are a CDISC SDTM mapping specialist. You map raw clinical study \
         variables to SDTM domain variables.\n\
         \n\
         Respond with a single JSON object and nothing else:\n\
         {{\"domain\": \"<code>\", \"mappings\": [{{\"sdtm_variable\": ..., \
         \"pattern\": ..., \"source_dataset\": ..., \"source_variable\": ..., \
         \"derivation_rule\": ..., \"confidence\": <0..1>, \
         \"confidence_rationale\": ..., \"origin\": ..., \
         \"computational_method\": ...}}]}}\n\
         \n\
         pattern is one of: DIRECT, RENAME, REFORMAT, SPLIT, COMBINE, \
         DERIVATION, LOOKUP_RECODE, TRANSPOSE, ASSIGN.\n\
         origin is one of: CRF, Derived, Assigned, Protocol, eDT, Predecessor.\n\
         \n\
         derivation_rule is EITHER a constant value (only for ASSIGN) OR a \
         call using exactly one of these keywords:\n{}\n\
         Do not invent keywords. A rule outside this vocabulary is rejected \
         and the mapping fails.",
        VOCABULARY_KEYWORDS
            .iter()
            .map(|k| format!("  - {k}"))
            .collect::<Vec<_>>()
            .join("\n")
    )
}

/// Inputs assembled into the user prompt.
pub struct MappingPromptInput<'a> {
    /// Target domain reference spec.
    pub domain_spec: &'a DomainSpec,

    /// Profiles of the source datasets feeding this domain.
    pub profiles: &'a [&'a DatasetProfile],

    /// eCRF forms associated with the source datasets, when parsed.
    pub ecrf_forms: &'a [EcrfForm],

    /// Retrieved few-shot examples, already rendered as text lines.
    pub examples: &'a [String],

    /// Study identifier.
    pub study_id: &'a str,
}

/// Build the user prompt: reference context, then retrieved examples, then
/// the task instruction.
pub fn build_mapping_prompt(input: &MappingPromptInput<'_>) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "Target domain: {} ({}): {}\nStructure: {}\n\nReference variables:\n",
        input.domain_spec.domain,
        input.domain_spec.class,
        input.domain_spec.label,
        input.domain_spec.structure,
    ));
    for var in &input.domain_spec.variables {
        let codelist = var
            .codelist_code
            .as_deref()
            .map(|c| format!(" [{c}]"))
            .unwrap_or_default();
        prompt.push_str(&format!(
            "  {} {} ({}, {}){}: {}\n",
            var.order,
            var.name,
            var.data_type,
            var.core.as_code(),
            codelist,
            var.label,
        ));
    }

    for profile in input.profiles {
        prompt.push_str(&format!(
            "\nSource dataset {} ({} rows):\n",
            profile.dataset_name, profile.row_count
        ));
        for column in profile.clinical_columns() {
            if let Some(var) = profile.variable(column) {
                let label = var.metadata.label.as_deref().unwrap_or("-");
                let samples = var.sample_values.join(", ");
                let date = if var.is_date { ", date" } else { "" };
                prompt.push_str(&format!(
                    "  {column} (label: {label}{date}; {:.0}% missing; e.g. {samples})\n",
                    var.missing_pct
                ));
            }
        }
    }

    for form in input.ecrf_forms {
        prompt.push_str(&format!("\neCRF form {}:\n", form.form_name));
        for field in &form.fields {
            prompt.push_str(&format!(
                "  {}: {} ({})\n",
                field.field_name, field.sas_label, field.data_type
            ));
        }
    }

    if !input.examples.is_empty() {
        prompt.push_str("\nPrior mapping decisions from similar studies:\n");
        for example in input.examples {
            prompt.push_str(&format!("  {example}\n"));
        }
    }

    prompt.push_str(&format!(
        "\nPropose mappings for every {} variable you can source from study \
         {}. Leave unmappable Required variables out rather than guessing; \
         they will be reported as missing. Use GENERATE_USUBJID for USUBJID \
         and ASSIGN for constants like STUDYID and DOMAIN.",
        input.domain_spec.domain, input.study_id
    ));

    prompt
}
