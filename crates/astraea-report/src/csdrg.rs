//! Clinical Study Data Reviewer's Guide rendering.
//!
//! One minijinja template, eight PHUSE sections. The study description
//! is a placeholder the medical writer fills in; everything else renders
//! from pipeline state.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use astraea_model::{DomainMappingSpec, ValidationReport};

/// Per-domain row of the dataset overview table.
#[derive(Debug, Clone, Serialize)]
pub struct CsdrgDomainRow {
    /// Domain code.
    pub domain: String,

    /// Domain label.
    pub label: String,

    /// Dataset class.
    pub class: String,

    /// Record count in the executed dataset.
    pub records: usize,

    /// Mapping pattern counts rendered as "DIRECT×12, DERIVATION×4".
    pub pattern_breakdown: String,

    /// SUPPQUAL candidate variables.
    pub suppqual_candidates: Vec<String>,

    /// Required variables without a mapping.
    pub missing_required: Vec<String>,
}

/// Everything the template needs.
pub struct CsdrgInput<'a> {
    /// Study identifier.
    pub study_id: &'a str,

    /// SDTM-IG version.
    pub ig_version: &'a str,

    /// CT version.
    pub ct_version: &'a str,

    /// Per-domain overview rows.
    pub domains: Vec<CsdrgDomainRow>,

    /// Execution warnings worth surfacing as data issues.
    pub data_issues: Vec<String>,

    /// The latest validation report.
    pub report: &'a ValidationReport,
}

const TEMPLATE: &str = r#"# Clinical Study Data Reviewer's Guide

## 1. Introduction

This Study Data Reviewer's Guide describes the SDTM datasets submitted for
study {{ study_id }}. It follows the PHUSE cSDRG template.

## 2. Study Description

> _To be completed by the study team: protocol title, design, population,
> and objectives._

## 3. Data Standards

| Standard | Version |
|---|---|
| SDTM Implementation Guide | {{ ig_version }} |
| Controlled Terminology | {{ ct_version }} |
| Transport format | SAS Transport v5 |

## 4. Dataset Overview

| Dataset | Label | Class | Records |
|---|---|---|---|
{%- for d in domains %}
| {{ d.domain }} | {{ d.label }} | {{ d.class }} | {{ d.records }} |
{%- endfor %}

## 5. Domain-Specific Information

{% for d in domains -%}
### {{ d.domain }}: {{ d.label }}

Mapping patterns: {{ d.pattern_breakdown }}

{% if d.missing_required -%}
Required variables without a source: {{ d.missing_required | join(", ") }}
{% endif -%}
{% if d.suppqual_candidates -%}
Supplemental qualifiers (SUPP{{ d.domain }}): {{ d.suppqual_candidates | join(", ") }}
{% endif %}
{% endfor %}

## 6. Data Issues

{% if data_issues -%}
{% for issue in data_issues -%}
- {{ issue }}
{% endfor -%}
{% else -%}
No data issues were identified during transformation.
{% endif %}

## 7. Validation Results

Conformance pass rate: {{ pass_rate }}% of domains with zero effective
errors. Effective error count: {{ effective_error_count }}.
Submission ready: {{ "Yes" if submission_ready else "No" }}.

| Rule | Severity | Domain | Findings |
|---|---|---|---|
{%- for r in findings %}
| {{ r.rule_id }} | {{ r.severity }} | {{ r.domain or "-" }} | {{ r.message }} |
{%- endfor %}

{% if known_false_positives -%}
### Known False Positives

| Rule | Domain | Variable | Reason |
|---|---|---|---|
{%- for r in known_false_positives %}
| {{ r.rule_id }} | {{ r.domain or "-" }} | {{ r.variable or "-" }} | {{ r.reason }} |
{%- endfor %}
{% endif %}

## 8. Non-Standard Variables

{% if nonstandard -%}
{% for v in nonstandard -%}
- {{ v }}
{% endfor -%}
{% else -%}
All submitted variables are SDTM-IG standard variables.
{% endif %}
"#;

#[derive(Serialize)]
struct FindingRow {
    rule_id: String,
    severity: String,
    domain: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct FalsePositiveRow {
    rule_id: String,
    domain: Option<String>,
    variable: Option<String>,
    reason: String,
}

/// Render the cSDRG Markdown.
pub fn render_csdrg(input: &CsdrgInput<'_>) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("csdrg", TEMPLATE)
        .context("register cSDRG template")?;
    let template = env.get_template("csdrg").context("load cSDRG template")?;

    let findings: Vec<FindingRow> = input
        .report
        .all_results()
        .map(|r| FindingRow {
            rule_id: r.rule_id.clone(),
            severity: r.severity.to_string(),
            domain: r.domain.clone(),
            message: r.message.clone(),
        })
        .collect();

    let known_false_positives: Vec<FalsePositiveRow> = input
        .report
        .all_results()
        .filter(|r| r.known_false_positive)
        .map(|r| FalsePositiveRow {
            rule_id: r.rule_id.clone(),
            domain: r.domain.clone(),
            variable: r.variable.clone(),
            reason: r
                .known_false_positive_reason
                .clone()
                .unwrap_or_else(|| "documented false positive".to_string()),
        })
        .collect();

    let nonstandard: Vec<String> = input
        .domains
        .iter()
        .flat_map(|d| {
            d.suppqual_candidates
                .iter()
                .map(move |v| format!("{}.{v}", d.domain))
        })
        .collect();

    template
        .render(context! {
            study_id => input.study_id,
            ig_version => input.ig_version,
            ct_version => input.ct_version,
            domains => &input.domains,
            data_issues => &input.data_issues,
            pass_rate => format!("{:.1}", input.report.pass_rate),
            effective_error_count => input.report.effective_error_count,
            submission_ready => input.report.submission_ready,
            findings => findings,
            known_false_positives => known_false_positives,
            nonstandard => nonstandard,
        })
        .context("render cSDRG")
}

/// Build the pattern-breakdown string for a spec.
pub fn pattern_breakdown(spec: &DomainMappingSpec) -> String {
    let mut counts: std::collections::BTreeMap<String, usize> = Default::default();
    for mapping in spec.variable_mappings.values() {
        *counts.entry(mapping.pattern.to_string()).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .map(|(pattern, count)| format!("{pattern}\u{00d7}{count}"))
        .collect::<Vec<_>>()
        .join(", ")
}
