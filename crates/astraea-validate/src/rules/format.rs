//! FORMAT rules.

use std::path::Path;
use std::sync::OnceLock;

use polars::prelude::DataFrame;
use regex::Regex;

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_standards::ReferenceStore;

use crate::util::{column_strings, finding};

/// The SDTM ISO 8601 shape: right-truncating date, optional time.
pub fn iso8601_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^\d{4}(-\d{2}(-\d{2}(T\d{2}(:\d{2}(:\d{2})?)?)?)?)?$")
            .unwrap_or_else(|_| unreachable!())
    })
}

/// ASTR-F001: --DTC columns hold ISO 8601 values or nothing.
pub fn dtc_iso8601(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let regex = iso8601_regex();
    let mut results = Vec::new();

    for column in df.get_column_names() {
        if !column.to_uppercase().ends_with("DTC") {
            continue;
        }
        let mut bad = 0u64;
        let mut examples: Vec<String> = Vec::new();
        for value in column_strings(df, column).into_iter().flatten() {
            if !regex.is_match(&value) {
                bad += 1;
                if examples.len() < 5 && !examples.contains(&value) {
                    examples.push(value);
                }
            }
        }
        if bad > 0 {
            results.push(finding(
                "ASTR-F001",
                "Date/time values must be ISO 8601",
                RuleCategory::Format,
                Severity::Error,
                Some(domain),
                Some(column.as_str()),
                format!("{bad} value(s) not ISO 8601: {}", examples.join(", ")),
                bad,
            ));
        }
    }
    Ok(results)
}

/// ASTR-F002: all character data must be ASCII.
pub fn ascii_only(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let mut results = Vec::new();
    for column in df.get_column_names() {
        let bad = column_strings(df, column)
            .into_iter()
            .flatten()
            .filter(|v| !v.is_ascii())
            .count() as u64;
        if bad > 0 {
            results.push(finding(
                "ASTR-F002",
                "Transport data must be ASCII",
                RuleCategory::Format,
                Severity::Error,
                Some(domain),
                Some(column.as_str()),
                format!("{bad} non-ASCII value(s)"),
                bad,
            ));
        }
    }
    Ok(results)
}

/// ASTR-F003: the transport file is named `<domain>.xpt`, lowercase.
///
/// Runs only when the output directory is known.
pub fn filename_convention(domain: &str, output_dir: &Path) -> Vec<RuleResult> {
    let expected = format!("{}.xpt", domain.to_lowercase());
    if output_dir.join(&expected).is_file() {
        return Vec::new();
    }

    // A wrongly-cased twin is the common failure.
    let misnamed = std::fs::read_dir(output_dir)
        .ok()
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .find(|name| name.eq_ignore_ascii_case(&expected) && name != &expected);

    let message = match misnamed {
        Some(actual) => format!("Found {actual}; transport files must be named {expected}"),
        None => format!("Expected transport file {expected} not found"),
    };
    vec![finding(
        "ASTR-F003",
        "Transport filenames are lowercase <domain>.xpt",
        RuleCategory::Format,
        Severity::Error,
        Some(domain),
        None,
        message,
        1,
    )]
}
