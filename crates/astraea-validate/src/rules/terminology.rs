//! TERMINOLOGY rules.

use polars::prelude::DataFrame;

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_standards::ReferenceStore;

use crate::util::{actual_column, column_strings, finding};

/// ASTR-T001: controlled values must come from their codelist.
///
/// Non-extensible codelists raise errors; extensible codelists warn.
pub fn ct_values_in_codelist(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let spec = store
        .get_domain_spec(domain)
        .map_err(|e| e.to_string())?;
    let mut results = Vec::new();

    for variable in &spec.variables {
        let Some(code) = variable.codelist_code.as_deref() else {
            continue;
        };
        let Some(codelist) = store.lookup_codelist(code) else {
            continue;
        };
        let Some(column) = actual_column(df, &variable.name) else {
            continue;
        };

        let mut invalid: Vec<String> = Vec::new();
        let mut affected = 0u64;
        for value in column_strings(df, column).into_iter().flatten() {
            if !codelist.contains(&value) {
                affected += 1;
                if !invalid.contains(&value) {
                    invalid.push(value);
                }
            }
        }
        if invalid.is_empty() {
            continue;
        }

        let severity = if codelist.extensible {
            Severity::Warning
        } else {
            Severity::Error
        };
        let examples: Vec<&str> = invalid.iter().take(5).map(String::as_str).collect();
        let mut result = finding(
            "ASTR-T001",
            "Controlled terminology value must be in its codelist",
            RuleCategory::Terminology,
            severity,
            Some(domain),
            Some(&variable.name),
            format!(
                "{} value(s) not in {} ({}): {}",
                affected,
                codelist.name,
                codelist.code,
                examples.join(", ")
            ),
            affected,
        );
        result.p21_equivalent = Some("CT2001".to_string());
        result.fix_suggestion = Some(format!(
            "Map the values through codelist {} or confirm sponsor extension",
            codelist.code
        ));
        results.push(result);
    }

    Ok(results)
}

/// ASTR-T002: the DOMAIN column must hold the domain code in every row.
pub fn domain_column_matches(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let Some(column) = actual_column(df, "DOMAIN") else {
        return Ok(vec![finding(
            "ASTR-T002",
            "DOMAIN column must equal the domain code",
            RuleCategory::Terminology,
            Severity::Error,
            Some(domain),
            Some("DOMAIN"),
            "DOMAIN column is missing".to_string(),
            df.height() as u64,
        )]);
    };

    let mismatches = column_strings(df, column)
        .into_iter()
        .filter(|value| value.as_deref() != Some(domain))
        .count() as u64;

    if mismatches == 0 {
        return Ok(Vec::new());
    }
    let mut result = finding(
        "ASTR-T002",
        "DOMAIN column must equal the domain code",
        RuleCategory::Terminology,
        Severity::Error,
        Some(domain),
        Some("DOMAIN"),
        format!("{mismatches} row(s) where DOMAIN != {domain}"),
        mismatches,
    );
    result.fix_suggestion = Some(format!("Set DOMAIN to {domain:?} on every row"));
    Ok(vec![result])
}
