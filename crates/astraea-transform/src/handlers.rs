//! Value-level handlers for the derivation-rule vocabulary.

use polars::prelude::{AnyValue, DataFrame};
use tracing::warn;

use astraea_model::Codelist;

use crate::datetime::{
    format_partial_iso8601, parse_string_date_to_iso, sas_date_to_iso, sas_datetime_to_iso,
};
use crate::error::TransformError;
use crate::resolve::ColumnResolver;
use crate::usubjid::generate_usubjid;

/// All values of a column as trimmed strings; blank and null become None.
pub fn string_values(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    let Ok(series) = df.column(column) else {
        return vec![None; df.height()];
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
            AnyValue::Float64(v) => Some(format_numeric(v)),
            AnyValue::Float32(v) => Some(format_numeric(v as f64)),
            other => Some(other.to_string()),
        })
        .collect()
}

/// All values of a column as numbers; unparseable strings become None.
pub fn numeric_values(df: &DataFrame, column: &str) -> Vec<Option<f64>> {
    string_values(df, column)
        .into_iter()
        .map(|opt| opt.and_then(|s| s.trim().parse::<f64>().ok()))
        .collect()
}

/// Integer-style rendering for whole numbers so "1" stays "1", not "1.0".
fn format_numeric(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// GENERATE_USUBJID: STUDYID + delimiter + SITEID + delimiter + SUBJID.
pub fn generate_usubjid_column(
    df: &DataFrame,
    resolver: &ColumnResolver,
    study_id: &str,
    delimiter: &str,
) -> Result<Vec<Option<String>>, TransformError> {
    let site_col = resolver
        .resolve("SITEID")
        .or_else(|| resolver.resolve("SSITENUM"))
        .ok_or_else(|| TransformError::CriticalColumnUnresolved {
            variable: "USUBJID".to_string(),
            token: "SITEID".to_string(),
        })?
        .to_string();
    let subj_col = resolver
        .resolve("SUBJID")
        .or_else(|| resolver.resolve("SSUBJID"))
        .ok_or_else(|| TransformError::CriticalColumnUnresolved {
            variable: "USUBJID".to_string(),
            token: "SUBJID".to_string(),
        })?
        .to_string();

    let sites = string_values(df, &site_col);
    let subjects = string_values(df, &subj_col);

    sites
        .iter()
        .zip(subjects.iter())
        .map(|(site, subject)| {
            let site = site.as_deref().unwrap_or("");
            let subject = subject.as_deref().unwrap_or("");
            generate_usubjid(study_id, site, subject, delimiter).map(Some)
        })
        .collect()
}

/// CONCAT: resolved tokens read columns, unresolved tokens are literals.
pub fn concat_column(
    df: &DataFrame,
    resolver: &ColumnResolver,
    tokens: &[String],
) -> Vec<Option<String>> {
    enum Part {
        Column(Vec<Option<String>>),
        Literal(String),
    }

    let parts: Vec<Part> = tokens
        .iter()
        .map(|token| match resolver.resolve(token) {
            Some(column) => Part::Column(string_values(df, column)),
            None => Part::Literal(token.clone()),
        })
        .collect();

    (0..df.height())
        .map(|idx| {
            let mut out = String::new();
            let mut any = false;
            for part in &parts {
                match part {
                    Part::Column(values) => {
                        if let Some(value) = values.get(idx).and_then(|v| v.as_deref()) {
                            out.push_str(value);
                            any = true;
                        }
                    }
                    Part::Literal(text) => out.push_str(text),
                }
            }
            any.then_some(out)
        })
        .collect()
}

/// ISO8601_DATE: SAS numeric date to `YYYY-MM-DD`.
pub fn iso_date_column(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    numeric_values(df, column)
        .into_iter()
        .map(|opt| opt.and_then(sas_date_to_iso))
        .collect()
}

/// ISO8601_DATETIME: SAS numeric datetime to `YYYY-MM-DDTHH:MM:SS`.
pub fn iso_datetime_column(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    numeric_values(df, column)
        .into_iter()
        .map(|opt| opt.and_then(sas_datetime_to_iso))
        .collect()
}

/// PARSE_STRING_DATE: free-text dates through the recognized chain.
pub fn parse_string_date_column(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    string_values(df, column)
        .into_iter()
        .map(|opt| opt.and_then(|v| parse_string_date_to_iso(&v)))
        .collect()
}

/// ISO8601_PARTIAL_DATE: year/month/day columns to a truncating partial.
pub fn partial_date_column(
    df: &DataFrame,
    resolver: &ColumnResolver,
    year: Option<&str>,
    month: Option<&str>,
    day: Option<&str>,
) -> Vec<Option<String>> {
    let read = |token: Option<&str>| -> Option<Vec<Option<f64>>> {
        let token = token?;
        let column = resolver.resolve(token)?;
        Some(numeric_values(df, column))
    };
    let years = read(year);
    let months = read(month);
    let days = read(day);

    (0..df.height())
        .map(|idx| {
            let component = |values: &Option<Vec<Option<f64>>>| {
                values.as_ref().and_then(|v| v.get(idx).copied().flatten())
            };
            format_partial_iso8601(
                component(&years).map(|y| y as i32),
                component(&months).map(|m| m as u32),
                component(&days).map(|d| d as u32),
                None,
                None,
                None,
            )
        })
        .collect()
}

/// Race terms inferred from checkbox column names.
const RACE_TOKENS: &[(&str, &str)] = &[
    ("AME", "AMERICAN INDIAN OR ALASKA NATIVE"),
    ("ASI", "ASIAN"),
    ("BLK", "BLACK OR AFRICAN AMERICAN"),
    ("BLACK", "BLACK OR AFRICAN AMERICAN"),
    ("HAW", "NATIVE HAWAIIAN OR OTHER PACIFIC ISLANDER"),
    ("WHI", "WHITE"),
    ("OTH", "OTHER"),
];

/// RACE_CHECKBOX: one C74457 term when exactly one box is checked,
/// "MULTIPLE" when several are, NULL when none.
pub fn race_checkbox_column(
    df: &DataFrame,
    resolver: &ColumnResolver,
    checkbox_tokens: &[String],
) -> Vec<Option<String>> {
    let boxes: Vec<(String, Vec<Option<f64>>)> = checkbox_tokens
        .iter()
        .filter_map(|token| {
            let column = resolver.resolve(token)?;
            let term = race_term_for(column)?;
            Some((term.to_string(), numeric_values(df, column)))
        })
        .collect();

    (0..df.height())
        .map(|idx| {
            let checked: Vec<&str> = boxes
                .iter()
                .filter(|(_, values)| {
                    values.get(idx).copied().flatten().is_some_and(|v| v == 1.0)
                })
                .map(|(term, _)| term.as_str())
                .collect();
            match checked.len() {
                0 => None,
                1 => Some(checked[0].to_string()),
                _ => Some("MULTIPLE".to_string()),
            }
        })
        .collect()
}

fn race_term_for(column: &str) -> Option<&'static str> {
    let upper = column.to_uppercase();
    RACE_TOKENS
        .iter()
        .find(|(token, _)| upper.contains(token))
        .map(|(_, term)| *term)
}

/// NUMERIC_TO_YN: 0 to N, 1 to Y, everything else NULL (never guess).
pub fn numeric_to_yn_column(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    numeric_values(df, column)
        .into_iter()
        .map(|opt| match opt {
            Some(v) if v == 0.0 => Some("N".to_string()),
            Some(v) if v == 1.0 => Some("Y".to_string()),
            _ => None,
        })
        .collect()
}

/// LOOKUP_RECODE: resolve each value through the codelist, matching both
/// submission values and preferred terms. Unmatched values pass through
/// unchanged with a warning.
pub fn lookup_recode_column(
    df: &DataFrame,
    column: &str,
    codelist: &Codelist,
    warnings: &mut Vec<String>,
) -> Vec<Option<String>> {
    let mut unmatched: Vec<String> = Vec::new();
    let values = string_values(df, column)
        .into_iter()
        .map(|opt| {
            opt.map(|value| match codelist.resolve(&value) {
                Some(canonical) => canonical.to_string(),
                None => {
                    if !unmatched.contains(&value) {
                        unmatched.push(value.clone());
                    }
                    value
                }
            })
        })
        .collect();

    if !unmatched.is_empty() {
        let message = format!(
            "{} value(s) in {} not found in codelist {} ({}): {}",
            unmatched.len(),
            column,
            codelist.code,
            codelist.name,
            unmatched.join(", ")
        );
        warn!("{message}");
        warnings.push(message);
    }
    values
}
