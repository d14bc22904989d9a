//! Validation report output: JSON for machines, Markdown for reviewers.

use std::path::Path;

use anyhow::{Context, Result};

use astraea_model::{Severity, ValidationReport};

/// Write both renderings of the validation report into the output
/// directory (`validation_report.json` and `validation_report.md`).
pub fn write_validation_report(output_dir: &Path, report: &ValidationReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("serialize validation report")?;
    std::fs::write(output_dir.join("validation_report.json"), json)
        .context("write validation_report.json")?;

    std::fs::write(
        output_dir.join("validation_report.md"),
        render_validation_markdown(report),
    )
    .context("write validation_report.md")?;
    Ok(())
}

/// Render the Markdown view of a report.
pub fn render_validation_markdown(report: &ValidationReport) -> String {
    let mut out = String::from("# Validation Report\n\n");

    out.push_str(&format!(
        "- Generated: {}\n- Pass rate: {:.1}%\n- Effective errors: {}\n- Submission ready: {}\n\n",
        report.generated_at.to_rfc3339(),
        report.pass_rate,
        report.effective_error_count,
        if report.submission_ready { "yes" } else { "no" },
    ));

    let mut counts = [0usize; 3];
    for result in report.all_results() {
        match result.severity {
            Severity::Error => counts[0] += 1,
            Severity::Warning => counts[1] += 1,
            Severity::Notice => counts[2] += 1,
        }
    }
    out.push_str(&format!(
        "Findings: {} errors, {} warnings, {} notices.\n\n",
        counts[0], counts[1], counts[2]
    ));

    for (domain, validation) in &report.domains {
        if validation.results.is_empty() {
            continue;
        }
        out.push_str(&format!("## {domain}\n\n"));
        out.push_str("| Rule | Category | Severity | Variable | Message |\n");
        out.push_str("|---|---|---|---|---|\n");
        for result in &validation.results {
            let marker = if result.known_false_positive { " (KFP)" } else { "" };
            out.push_str(&format!(
                "| {} | {} | {}{} | {} | {} |\n",
                result.rule_id,
                result.category,
                result.severity,
                marker,
                result.variable.as_deref().unwrap_or("-"),
                result.message.replace('|', "\\|"),
            ));
        }
        out.push('\n');
    }

    if !report.study_results.is_empty() {
        out.push_str("## Study-Level\n\n");
        out.push_str("| Rule | Category | Severity | Domain | Message |\n");
        out.push_str("|---|---|---|---|---|\n");
        for result in &report.study_results {
            out.push_str(&format!(
                "| {} | {} | {} | {} | {} |\n",
                result.rule_id,
                result.category,
                result.severity,
                result.domain.as_deref().unwrap_or("-"),
                result.message.replace('|', "\\|"),
            ));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{DomainValidation, RuleCategory, RuleResult};
    use std::collections::BTreeMap;

    #[test]
    fn markdown_lists_findings_and_flags_kfp() {
        let mut domains = BTreeMap::new();
        domains.insert(
            "LB".to_string(),
            DomainValidation {
                results: vec![RuleResult {
                    rule_id: "SD1076".to_string(),
                    rule_description: String::new(),
                    category: RuleCategory::Terminology,
                    severity: Severity::Error,
                    domain: Some("LB".to_string()),
                    variable: Some("LBSTRESC".to_string()),
                    message: "value mismatch".to_string(),
                    affected_count: 2,
                    fix_suggestion: None,
                    p21_equivalent: None,
                    known_false_positive: true,
                    known_false_positive_reason: Some("P21 v2405.2".to_string()),
                }],
            },
        );
        let report = ValidationReport::from_results(domains, Vec::new());

        let md = render_validation_markdown(&report);
        assert!(md.contains("SD1076"));
        assert!(md.contains("(KFP)"));
        assert!(md.contains("Submission ready: yes"));
    }
}
