//! The deterministic auto-fixer.
//!
//! Classifies validation findings into auto-fixable, needs-human, and
//! informational; applies the fixable ones in place; and re-validates in
//! a bounded loop. Every action lands in an audit trail.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use polars::prelude::{Column, DataFrame};
use serde::{Deserialize, Serialize};
use tracing::info;

use astraea_model::{Codelist, FixDisposition, RuleResult, Severity, ValidationReport, WhitelistEntry};
use astraea_standards::ReferenceStore;

use crate::engine::{ValidationInput, validate_study};
use crate::util::{actual_column, column_strings};

/// Maximum validate-fix-revalidate iterations.
const MAX_ITERATIONS: usize = 3;

/// One applied (or declined) fix, for the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixAction {
    /// Loop iteration the action happened in (1-based).
    pub iteration: usize,

    /// Rule that triggered the action.
    pub rule_id: String,

    /// Domain concerned.
    pub domain: Option<String>,

    /// Variable concerned.
    pub variable: Option<String>,

    /// The disposition assigned to the finding.
    pub disposition: FixDisposition,

    /// What was done (or why nothing was).
    pub action: String,

    /// When the action happened.
    pub timestamp: DateTime<Utc>,
}

/// The audit trail written to `autofix_audit.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutofixAudit {
    /// Iterations actually run.
    pub iterations: usize,

    /// Whether the loop ended with zero auto-fixable findings left.
    pub converged: bool,

    /// All recorded actions.
    pub actions: Vec<FixAction>,
}

/// Classify one finding.
///
/// Missing USUBJID values can only be repaired from source data, so
/// ASTR-P004 is needs-human no matter how simple it looks. Cross-domain
/// orphans likewise. Notices are always informational.
pub fn classify_finding(result: &RuleResult) -> FixDisposition {
    if result.severity == Severity::Notice {
        return FixDisposition::Informational;
    }
    match result.rule_id.as_str() {
        // Case-only CT mismatches, DOMAIN column repair, name/label trims.
        "ASTR-T001" | "ASTR-T002" | "ASTR-C004" | "ASTR-L001" | "ASTR-L002" => {
            FixDisposition::AutoFixable
        }
        // Requires source data or sponsor judgment.
        "ASTR-P004" | "ASTR-C001" => FixDisposition::NeedsHuman,
        _ => {
            if result.severity == Severity::Error {
                FixDisposition::NeedsHuman
            } else {
                FixDisposition::Informational
            }
        }
    }
}

/// Run the bounded validate-fix-revalidate loop.
///
/// Frames are mutated in place; the caller rewrites the affected
/// transport files and persists the audit. The final report reflects the
/// state after the last fix.
pub fn run_autofix(
    frames: &mut BTreeMap<String, DataFrame>,
    store: &ReferenceStore,
    output_dir: Option<&Path>,
    whitelist: &[WhitelistEntry],
) -> (ValidationReport, AutofixAudit) {
    let mut audit = AutofixAudit::default();
    let mut report = validate_study(&ValidationInput {
        frames,
        store,
        output_dir,
        whitelist,
    });

    for iteration in 1..=MAX_ITERATIONS {
        audit.iterations = iteration;

        let fixable: Vec<RuleResult> = report
            .all_results()
            .filter(|r| {
                !r.known_false_positive && classify_finding(r) == FixDisposition::AutoFixable
            })
            .cloned()
            .collect();

        if fixable.is_empty() {
            audit.converged = true;
            break;
        }

        for result in &fixable {
            let action = apply_fix(frames, store, result);
            audit.actions.push(FixAction {
                iteration,
                rule_id: result.rule_id.clone(),
                domain: result.domain.clone(),
                variable: result.variable.clone(),
                disposition: FixDisposition::AutoFixable,
                action,
                timestamp: Utc::now(),
            });
        }

        // Record what stays with the human, once per iteration.
        if iteration == 1 {
            for result in report.all_results() {
                if classify_finding(result) == FixDisposition::NeedsHuman {
                    audit.actions.push(FixAction {
                        iteration,
                        rule_id: result.rule_id.clone(),
                        domain: result.domain.clone(),
                        variable: result.variable.clone(),
                        disposition: FixDisposition::NeedsHuman,
                        action: "left for human review".to_string(),
                        timestamp: Utc::now(),
                    });
                }
            }
        }

        report = validate_study(&ValidationInput {
            frames,
            store,
            output_dir,
            whitelist,
        });
    }

    info!(
        iterations = audit.iterations,
        converged = audit.converged,
        actions = audit.actions.len(),
        "auto-fix loop finished"
    );
    (report, audit)
}

/// Apply one fix to the frames; returns a description of what was done.
fn apply_fix(
    frames: &mut BTreeMap<String, DataFrame>,
    store: &ReferenceStore,
    result: &RuleResult,
) -> String {
    let Some(domain) = result.domain.as_deref() else {
        return "no domain on finding; skipped".to_string();
    };
    let Some(frame) = frames.get_mut(domain) else {
        return format!("domain {domain} not loaded; skipped");
    };

    match result.rule_id.as_str() {
        "ASTR-T002" | "ASTR-C004" => {
            let height = frame.height();
            let values = vec![Some(domain.to_string()); height];
            match frame.with_column(Column::new("DOMAIN".into(), values)) {
                Ok(_) => format!("set DOMAIN to {domain:?} on {height} row(s)"),
                Err(e) => format!("failed to set DOMAIN: {e}"),
            }
        }
        "ASTR-L001" => {
            let Some(variable) = result.variable.as_deref() else {
                return "no variable on finding; skipped".to_string();
            };
            let truncated: String = variable.chars().take(8).collect();
            match frame.rename(variable, truncated.as_str().into()) {
                Ok(_) => format!("renamed {variable} to {truncated}"),
                Err(e) => format!("failed to rename {variable}: {e}"),
            }
        }
        "ASTR-L002" => {
            // Labels live in the reference spec and are applied at write
            // time; the rewrite picks up the corrected label.
            "label re-applied from reference spec at next write".to_string()
        }
        "ASTR-T001" => {
            let Some(variable) = result.variable.as_deref() else {
                return "no variable on finding; skipped".to_string();
            };
            let codelist = store
                .get_variable_spec(domain, variable)
                .and_then(|spec| spec.codelist_code.as_deref())
                .and_then(|code| store.lookup_codelist(code));
            match codelist {
                Some(codelist) => {
                    let changed = recase_against_codelist(frame, variable, codelist);
                    format!("recased {changed} value(s) against {}", codelist.code)
                }
                None => "no codelist available; structural CT issue left for human".to_string(),
            }
        }
        other => format!("no fixer implemented for {other}"),
    }
}

/// Recase a column's values to their canonical codelist casing.
fn recase_against_codelist(frame: &mut DataFrame, variable: &str, codelist: &Codelist) -> usize {
    let Some(column) = actual_column(frame, variable).map(str::to_string) else {
        return 0;
    };
    let mut changed = 0usize;
    let repaired: Vec<Option<String>> = column_strings(frame, &column)
        .into_iter()
        .map(|opt| {
            opt.map(|value| match codelist.resolve(&value) {
                Some(canonical) if canonical != value => {
                    changed += 1;
                    canonical.to_string()
                }
                _ => value,
            })
        })
        .collect();
    if changed > 0 {
        let _ = frame.with_column(Column::new(column.as_str().into(), repaired));
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::finding;
    use astraea_model::RuleCategory;
    use astraea_model::Term;

    #[test]
    fn missing_usubjid_is_never_auto_fixable() {
        let result = finding(
            "ASTR-P004",
            "",
            RuleCategory::Presence,
            Severity::Error,
            Some("AE"),
            Some("USUBJID"),
            String::new(),
            3,
        );
        assert_eq!(classify_finding(&result), FixDisposition::NeedsHuman);
    }

    #[test]
    fn orphan_subjects_need_human() {
        let result = finding(
            "ASTR-C001",
            "",
            RuleCategory::Consistency,
            Severity::Error,
            Some("AE"),
            Some("USUBJID"),
            String::new(),
            1,
        );
        assert_eq!(classify_finding(&result), FixDisposition::NeedsHuman);
    }

    #[test]
    fn notices_are_informational() {
        let result = finding(
            "ASTR-L004",
            "",
            RuleCategory::Limit,
            Severity::Notice,
            Some("LB"),
            None,
            String::new(),
            0,
        );
        assert_eq!(classify_finding(&result), FixDisposition::Informational);
    }

    #[test]
    fn domain_column_repair_is_auto_fixable() {
        let result = finding(
            "ASTR-T002",
            "",
            RuleCategory::Terminology,
            Severity::Error,
            Some("DM"),
            Some("DOMAIN"),
            String::new(),
            2,
        );
        assert_eq!(classify_finding(&result), FixDisposition::AutoFixable);
    }

    #[test]
    fn recasing_repairs_case_only_mismatches() {
        let mut codelist = Codelist::new("C66731", "Sex", false);
        codelist.add_term(Term {
            submission_value: "M".to_string(),
            nci_preferred_term: Some("Male".to_string()),
            definition: None,
        });
        let mut frame = polars::df! {"SEX" => ["m", "M", "x"]}.unwrap();
        let changed = recase_against_codelist(&mut frame, "SEX", &codelist);
        assert_eq!(changed, 1);
    }
}
