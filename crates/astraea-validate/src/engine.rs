//! The validation engine: rule orchestration and report assembly.

use std::collections::BTreeMap;
use std::path::Path;

use polars::prelude::DataFrame;
use tracing::{info, warn};

use astraea_model::{
    DomainValidation, RuleCategory, RuleResult, Severity, ValidationReport, WhitelistEntry,
};
use astraea_standards::ReferenceStore;

use crate::rules::{consistency, fda_business, fda_trc, format, limits, presence, terminology};
use crate::util::finding;
use crate::whitelist::apply_whitelist;

/// Everything the engine validates against.
pub struct ValidationInput<'a> {
    /// Executed domain frames keyed by uppercase domain code.
    pub frames: &'a BTreeMap<String, DataFrame>,

    /// Reference store.
    pub store: &'a ReferenceStore,

    /// Output directory for file-level checks, when written.
    pub output_dir: Option<&'a Path>,

    /// Known-false-positive whitelist.
    pub whitelist: &'a [WhitelistEntry],
}

type DomainRule = fn(&str, &DataFrame, &ReferenceStore) -> Result<Vec<RuleResult>, String>;

/// Per-domain rules in execution order.
const DOMAIN_RULES: &[DomainRule] = &[
    terminology::ct_values_in_codelist,
    terminology::domain_column_matches,
    presence::core_variables_present,
    presence::nonzero_rows,
    presence::usubjid_populated,
    limits::name_lengths,
    limits::label_lengths,
    limits::char_byte_lengths,
    limits::dataset_size,
    format::dtc_iso8601,
    format::ascii_only,
    fda_business::ethnic_terms,
    fda_business::race_terms,
    fda_business::numeric_reference_ranges,
    fda_business::testcd_test_bijection,
    fda_business::consistent_standard_units,
];

/// Run every rule and assemble the whitelist-aware report.
pub fn validate_study(input: &ValidationInput<'_>) -> ValidationReport {
    let mut domains: BTreeMap<String, DomainValidation> = BTreeMap::new();

    for (domain, frame) in input.frames {
        let mut validation = DomainValidation::default();
        // SUPPQUAL datasets validate against the SUPPQUAL template spec.
        let rule_domain = if domain.starts_with("SUPP") && domain.len() > 4 {
            "SUPPQUAL"
        } else {
            domain.as_str()
        };

        for rule in DOMAIN_RULES {
            match rule(rule_domain, frame, input.store) {
                Ok(mut results) => {
                    // Findings carry the dataset's own code, not the
                    // template's.
                    for result in &mut results {
                        result.domain = Some(domain.clone());
                    }
                    validation.results.extend(results);
                }
                Err(message) => {
                    warn!(domain = %domain, error = %message, "rule failed; demoted to warning");
                    validation.results.push(rule_failure(domain, &message));
                }
            }
        }

        if let Some(output_dir) = input.output_dir {
            validation
                .results
                .extend(format::filename_convention(domain, output_dir));
        }

        domains.insert(domain.clone(), validation);
    }

    // Cross-domain rules see the full frame map after per-domain rules.
    let mut study_results = Vec::new();
    study_results.extend(consistency::usubjid_in_dm(input.frames));
    study_results.extend(consistency::single_studyid(input.frames));
    study_results.extend(consistency::rfstdtc_matches_first_exposure(input.frames));
    study_results.extend(consistency::domain_codes_match(input.frames));
    study_results.extend(consistency::study_day_signs(input.frames));
    study_results.extend(fda_trc::ts_with_study_start(input.frames));
    study_results.extend(fda_trc::dm_present(input.frames));
    study_results.extend(fda_trc::consistent_studyid(input.frames));
    if let Some(output_dir) = input.output_dir {
        study_results.extend(fda_trc::define_xml_present(output_dir));
        study_results.extend(fda_trc::filename_conventions(input.frames, output_dir));
    }

    let mut report = ValidationReport::from_results(domains, study_results);
    apply_whitelist(&mut report, input.whitelist);

    info!(
        effective_errors = report.effective_error_count,
        pass_rate = report.pass_rate,
        submission_ready = report.submission_ready,
        "validation complete"
    );
    report
}

fn rule_failure(domain: &str, message: &str) -> RuleResult {
    finding(
        "ASTR-ENGINE",
        "Validation rule raised an internal error",
        RuleCategory::Consistency,
        Severity::Warning,
        Some(domain),
        None,
        format!("rule failed: {message}"),
        0,
    )
}
