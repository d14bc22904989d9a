//! Shared helpers for rule implementations.

use polars::prelude::{AnyValue, DataFrame};

use astraea_model::{RuleCategory, RuleResult, Severity};

/// Read a column as trimmed strings; blanks and nulls are None.
pub fn column_strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    let Ok(series) = df.column(column) else {
        return Vec::new();
    };
    (0..df.height())
        .map(|idx| match series.get(idx).unwrap_or(AnyValue::Null) {
            AnyValue::Null => None,
            AnyValue::String(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            AnyValue::StringOwned(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            AnyValue::Float64(v) => Some(render_numeric(v)),
            AnyValue::Float32(v) => Some(render_numeric(v as f64)),
            other => Some(other.to_string()),
        })
        .collect()
}

fn render_numeric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Whether the frame has a column (case-insensitive).
pub fn has_column(df: &DataFrame, column: &str) -> bool {
    df.get_column_names()
        .iter()
        .any(|name| name.eq_ignore_ascii_case(column))
}

/// The frame's actual column name for a case-insensitive lookup.
pub fn actual_column<'a>(df: &'a DataFrame, column: &str) -> Option<&'a str> {
    df.get_column_names()
        .iter()
        .find(|name| name.eq_ignore_ascii_case(column))
        .map(|name| name.as_str())
}

/// Build a finding with the common fields filled in.
pub fn finding(
    rule_id: &str,
    description: &str,
    category: RuleCategory,
    severity: Severity,
    domain: Option<&str>,
    variable: Option<&str>,
    message: String,
    affected_count: u64,
) -> RuleResult {
    RuleResult {
        rule_id: rule_id.to_string(),
        rule_description: description.to_string(),
        category,
        severity,
        domain: domain.map(str::to_string),
        variable: variable.map(str::to_string),
        message,
        affected_count,
        fix_suggestion: None,
        p21_equivalent: None,
        known_false_positive: false,
        known_false_positive_reason: None,
    }
}
