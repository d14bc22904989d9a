//! Transport compliance pass.
//!
//! Runs immediately before a frame is handed to the transport writer:
//! name and label limits, byte-length limits, ASCII enforcement with a
//! repair pass for common typographic characters, sort order, and column
//! order. Violations are aggregated and reported together.

use polars::prelude::{Column, DataFrame, DataType, SortMultipleOptions};
use tracing::debug;

use astraea_model::DomainSpec;

use crate::error::TransformError;
use crate::frame::DomainFrame;
use crate::handlers::string_values;

/// Maximum byte length of a character value.
const MAX_CHAR_BYTES: usize = 200;

/// Replace the typographic characters EDC exports commonly carry with
/// their ASCII equivalents. Anything non-ASCII that survives this map is
/// a hard error downstream.
pub fn fix_common_non_ascii(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{02BC}' => "'".to_string(),
            '\u{201C}' | '\u{201D}' => "\"".to_string(),
            '\u{2013}' | '\u{2014}' | '\u{2212}' => "-".to_string(),
            '\u{00A0}' => " ".to_string(),
            '\u{2026}' => "...".to_string(),
            '\u{00B0}' => " deg".to_string(),
            '\u{00B5}' | '\u{03BC}' => "u".to_string(),
            '\u{00D7}' => "x".to_string(),
            '\u{00B1}' => "+/-".to_string(),
            'é' | 'è' | 'ê' | 'ë' => "e".to_string(),
            'á' | 'à' | 'â' | 'ä' => "a".to_string(),
            'ó' | 'ò' | 'ô' | 'ö' => "o".to_string(),
            'ú' | 'ù' | 'û' | 'ü' => "u".to_string(),
            'ñ' => "n".to_string(),
            'ç' => "c".to_string(),
            other => other.to_string(),
        })
        .collect()
}

/// Apply the compliance pass in place.
///
/// All violations are collected and returned together so the operator
/// sees the complete list at once instead of fixing one per run.
pub fn apply_compliance(
    frame: &mut DomainFrame,
    domain_spec: &DomainSpec,
) -> Result<(), TransformError> {
    let mut violations = Vec::new();

    for name in frame.data.get_column_names() {
        check_variable_name(name.as_str(), &mut violations);
    }

    for variable in &domain_spec.variables {
        if variable.label.len() > 40 {
            violations.push(format!(
                "label of {} exceeds 40 characters: {:?}",
                variable.name, variable.label
            ));
        }
    }

    // ASCII repair, then byte-length and residual non-ASCII checks.
    let column_names: Vec<String> = frame
        .data
        .get_column_names()
        .iter()
        .map(|n| n.to_string())
        .collect();
    for name in &column_names {
        let Ok(column) = frame.data.column(name) else {
            continue;
        };
        if !matches!(column.dtype(), DataType::String) {
            continue;
        }

        let values = string_values(&frame.data, name);
        let repaired: Vec<Option<String>> = values
            .into_iter()
            .map(|opt| opt.map(|v| fix_common_non_ascii(&v)))
            .collect();

        for (idx, value) in repaired.iter().enumerate() {
            let Some(value) = value else { continue };
            if !value.is_ascii() {
                violations.push(format!(
                    "{name} row {idx} contains non-ASCII data after repair: {value:?}"
                ));
            }
            if value.len() > MAX_CHAR_BYTES {
                violations.push(format!(
                    "{name} row {idx} exceeds {MAX_CHAR_BYTES} bytes ({} bytes)",
                    value.len()
                ));
            }
        }

        frame
            .data
            .with_column(Column::new(name.as_str().into(), repaired))?;
    }

    // Unknown columns are rejected; SUPPQUAL candidates were moved to
    // their own dataset before this pass.
    let known: Vec<&str> = domain_spec.variable_names();
    for name in &column_names {
        if !known.iter().any(|k| k.eq_ignore_ascii_case(name)) {
            violations.push(format!(
                "column {name} is not a {} variable",
                domain_spec.domain
            ));
        }
    }

    if !violations.is_empty() {
        return Err(TransformError::ComplianceViolations(violations));
    }

    // Sort by the domain's key variables, then order columns per the
    // implementation guide.
    let sort_keys: Vec<String> = domain_spec
        .key_variables
        .iter()
        .filter(|k| column_names.iter().any(|c| c.eq_ignore_ascii_case(k)))
        .cloned()
        .collect();
    if !sort_keys.is_empty() {
        frame.data = frame
            .data
            .sort(sort_keys, SortMultipleOptions::default())?;
    }

    let ordered: Vec<&str> = known
        .iter()
        .copied()
        .filter(|k| column_names.iter().any(|c| c.eq_ignore_ascii_case(k)))
        .collect();
    frame.data = frame.data.select(ordered)?;

    debug!(domain = %frame.domain, "compliance pass complete");
    Ok(())
}

fn check_variable_name(name: &str, violations: &mut Vec<String>) {
    if name.len() > 8 {
        violations.push(format!("variable name {name} exceeds 8 characters"));
    }
    if name != name.to_uppercase() {
        violations.push(format!("variable name {name} is not uppercase"));
    }
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    if !starts_with_letter || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        violations.push(format!(
            "variable name {name} must start with a letter and use A-Z, 0-9, _"
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{CoreDesignation, DatasetClass, VariableSpec, VariableType};
    use polars::df;

    fn spec() -> DomainSpec {
        let var = |order: u32, name: &str, core: CoreDesignation| VariableSpec {
            order,
            name: name.to_string(),
            label: name.to_string(),
            data_type: VariableType::Char,
            length: Some(40),
            core,
            codelist_code: None,
            cdisc_notes: None,
        };
        DomainSpec {
            domain: "DM".to_string(),
            label: "Demographics".to_string(),
            class: DatasetClass::SpecialPurpose,
            structure: "One record per subject".to_string(),
            key_variables: vec!["STUDYID".to_string(), "USUBJID".to_string()],
            variables: vec![
                var(1, "STUDYID", CoreDesignation::Required),
                var(2, "USUBJID", CoreDesignation::Required),
                var(3, "SEX", CoreDesignation::Required),
            ],
        }
    }

    #[test]
    fn repairs_typographic_characters() {
        assert_eq!(fix_common_non_ascii("10\u{2013}20 \u{00B5}g"), "10-20 ug");
        assert_eq!(fix_common_non_ascii("37\u{00B0}C"), "37 degC");
    }

    #[test]
    fn sorts_and_reorders() {
        let data = df! {
            "SEX" => ["F", "M"],
            "USUBJID" => ["S-2", "S-1"],
            "STUDYID" => ["301", "301"],
        }
        .unwrap();
        let mut frame = DomainFrame::new("DM", data);
        apply_compliance(&mut frame, &spec()).unwrap();

        let names: Vec<String> = frame
            .data
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["STUDYID", "USUBJID", "SEX"]);

        let first = frame.data.column("USUBJID").unwrap().get(0).unwrap();
        assert_eq!(first.to_string().replace('"', ""), "S-1");
    }

    #[test]
    fn unknown_columns_are_rejected() {
        let data = df! {
            "STUDYID" => ["301"],
            "USUBJID" => ["S-1"],
            "PETNAME" => ["Rex"],
        }
        .unwrap();
        let mut frame = DomainFrame::new("DM", data);
        let err = apply_compliance(&mut frame, &spec()).unwrap_err();
        assert!(matches!(err, TransformError::ComplianceViolations(v)
            if v.iter().any(|m| m.contains("PETNAME"))));
    }

    #[test]
    fn residual_non_ascii_is_fatal() {
        let data = df! {
            "STUDYID" => ["301"],
            "USUBJID" => ["S-1"],
            "SEX" => ["\u{4E2D}"],
        }
        .unwrap();
        let mut frame = DomainFrame::new("DM", data);
        assert!(apply_compliance(&mut frame, &spec()).is_err());
    }
}
