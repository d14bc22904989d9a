//! LIMIT rules.

use polars::prelude::{DataFrame, DataType};

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_standards::ReferenceStore;

use crate::util::{column_strings, finding};

const MAX_NAME: usize = 8;
const MAX_LABEL: usize = 40;
const MAX_CHAR_BYTES: usize = 200;
const NOTICE_SIZE_BYTES: u64 = 100 * 1024 * 1024;
const WARNING_SIZE_BYTES: u64 = 500 * 1024 * 1024;

/// ASTR-L001: variable names at most 8 characters.
pub fn name_lengths(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let mut results = Vec::new();
    for name in df.get_column_names() {
        if name.len() > MAX_NAME {
            results.push(finding(
                "ASTR-L001",
                "Variable names are limited to 8 characters",
                RuleCategory::Limit,
                Severity::Error,
                Some(domain),
                Some(name.as_str()),
                format!("Name {name} is {} characters", name.len()),
                1,
            ));
        }
    }
    Ok(results)
}

/// ASTR-L002: variable labels at most 40 characters.
pub fn label_lengths(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let spec = store.get_domain_spec(domain).map_err(|e| e.to_string())?;
    let mut results = Vec::new();
    for name in df.get_column_names() {
        if let Some(variable) = spec.variable(name)
            && variable.label.len() > MAX_LABEL
        {
            results.push(finding(
                "ASTR-L002",
                "Variable labels are limited to 40 characters",
                RuleCategory::Limit,
                Severity::Error,
                Some(domain),
                Some(name.as_str()),
                format!("Label {:?} is {} characters", variable.label, variable.label.len()),
                1,
            ));
        }
    }
    Ok(results)
}

/// ASTR-L003: character values at most 200 bytes.
pub fn char_byte_lengths(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let mut results = Vec::new();
    for column in df.get_columns() {
        if !matches!(column.dtype(), DataType::String) {
            continue;
        }
        let over = column_strings(df, column.name())
            .into_iter()
            .flatten()
            .filter(|v| v.len() > MAX_CHAR_BYTES)
            .count() as u64;
        if over > 0 {
            results.push(finding(
                "ASTR-L003",
                "Character values are limited to 200 bytes",
                RuleCategory::Limit,
                Severity::Error,
                Some(domain),
                Some(column.name().as_str()),
                format!("{over} value(s) exceed {MAX_CHAR_BYTES} bytes"),
                over,
            ));
        }
    }
    Ok(results)
}

/// ASTR-L004: large datasets get a notice, very large ones a warning.
pub fn dataset_size(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let estimated = df.estimated_size() as u64;
    let severity = if estimated > WARNING_SIZE_BYTES {
        Severity::Warning
    } else if estimated > NOTICE_SIZE_BYTES {
        Severity::Notice
    } else {
        return Ok(Vec::new());
    };

    let mut result = finding(
        "ASTR-L004",
        "Very large datasets complicate review and transfer",
        RuleCategory::Limit,
        severity,
        Some(domain),
        None,
        format!("Estimated dataset size is {} MB", estimated / (1024 * 1024)),
        0,
    );
    result.fix_suggestion = Some(format!(
        "Consider splitting {domain} by its category variable"
    ));
    Ok(vec![result])
}
