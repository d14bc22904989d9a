//! PRESENCE rules.

use polars::prelude::DataFrame;

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_standards::ReferenceStore;

use crate::util::{actual_column, column_strings, finding, has_column};

/// ASTR-P001 / ASTR-P002: Required columns must exist (error); Expected
/// columns should exist (warning).
pub fn core_variables_present(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let spec = store.get_domain_spec(domain).map_err(|e| e.to_string())?;
    let mut results = Vec::new();

    for name in spec.required_variables() {
        if !has_column(df, name) {
            results.push(finding(
                "ASTR-P001",
                "Required variable column must be present",
                RuleCategory::Presence,
                Severity::Error,
                Some(domain),
                Some(name),
                format!("Required variable {name} is missing"),
                df.height() as u64,
            ));
        }
    }
    for name in spec.expected_variables() {
        if !has_column(df, name) {
            results.push(finding(
                "ASTR-P002",
                "Expected variable column should be present",
                RuleCategory::Presence,
                Severity::Warning,
                Some(domain),
                Some(name),
                format!("Expected variable {name} is missing"),
                df.height() as u64,
            ));
        }
    }

    Ok(results)
}

/// ASTR-P003: a submitted dataset should not be empty.
pub fn nonzero_rows(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    if df.height() > 0 {
        return Ok(Vec::new());
    }
    Ok(vec![finding(
        "ASTR-P003",
        "Dataset should contain at least one record",
        RuleCategory::Presence,
        Severity::Warning,
        Some(domain),
        None,
        "Dataset has zero rows".to_string(),
        0,
    )])
}

/// ASTR-P004: USUBJID must be populated on every row.
pub fn usubjid_populated(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let Some(column) = actual_column(df, "USUBJID") else {
        // Domains without USUBJID (TS, RELREC datasets) are exempt when
        // the reference agrees; the Required-variable check covers the
        // rest.
        return Ok(Vec::new());
    };

    let nulls = column_strings(df, column)
        .into_iter()
        .filter(Option::is_none)
        .count() as u64;
    if nulls == 0 {
        return Ok(Vec::new());
    }
    Ok(vec![finding(
        "ASTR-P004",
        "USUBJID must have no null values",
        RuleCategory::Presence,
        Severity::Error,
        Some(domain),
        Some("USUBJID"),
        format!("{nulls} row(s) with null USUBJID"),
        nulls,
    )])
}
