//! The findings executor: wide source data to the tall SDTM structure.
//!
//! Findings domains (LB, VS, ...) arrive as one column per test; SDTM
//! wants one row per test. A [`TransposeSpec`] declares the grouping
//! columns, the tests, and where each test's result and units live.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::{Column, DataFrame};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TransformError;
use crate::frame::DomainFrame;
use crate::handlers::{generate_usubjid_column, string_values};
use crate::resolve::ColumnResolver;

/// One wide test column group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeTest {
    /// --TESTCD value (≤8 chars, uppercase).
    pub testcd: String,

    /// --TEST value (≤40 chars).
    pub test: String,

    /// Wide column holding the result (--ORRES).
    pub result_column: String,

    /// Wide column holding the original unit (--ORRESU).
    #[serde(default)]
    pub unit_column: Option<String>,

    /// Constant unit when the source has no unit column.
    #[serde(default)]
    pub unit_value: Option<String>,

    /// Wide column holding the lower reference limit (--ORNRLO).
    #[serde(default)]
    pub range_low_column: Option<String>,

    /// Wide column holding the upper reference limit (--ORNRHI).
    #[serde(default)]
    pub range_high_column: Option<String>,
}

/// Declarative transpose specification for one findings domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransposeSpec {
    /// Target domain code (e.g., "LB").
    pub domain: String,

    /// Source columns carried to every output row (visit, date columns),
    /// mapped source column -> SDTM variable.
    pub carry_columns: BTreeMap<String, String>,

    /// The tests to unpivot.
    pub tests: Vec<TransposeTest>,
}

/// Execute a findings transpose over one or more wide source frames.
///
/// Multiple sources (`lb_biochem`, `lb_hem`, ...) are stacked first with
/// column alignment: the output column set is the union, missing cells
/// are null. Unit consistency per test code is checked; divergence is a
/// warning, not an error.
pub fn execute_findings(
    spec: &TransposeSpec,
    sources: &[(&str, &DataFrame)],
    study_id: &str,
    usubjid_delimiter: &str,
    custom_aliases: &BTreeMap<String, String>,
) -> Result<DomainFrame, TransformError> {
    if sources.is_empty() {
        return Err(TransformError::MissingDataset(spec.domain.clone()));
    }

    let prefix = spec.domain.to_uppercase();
    let mut warnings = Vec::new();

    let mut usubjid_out: Vec<Option<String>> = Vec::new();
    let mut testcd_out: Vec<Option<String>> = Vec::new();
    let mut test_out: Vec<Option<String>> = Vec::new();
    let mut orres_out: Vec<Option<String>> = Vec::new();
    let mut orresu_out: Vec<Option<String>> = Vec::new();
    let mut ornrlo_out: Vec<Option<String>> = Vec::new();
    let mut ornrhi_out: Vec<Option<String>> = Vec::new();
    let mut carry_out: BTreeMap<String, Vec<Option<String>>> = spec
        .carry_columns
        .values()
        .map(|target| (target.to_uppercase(), Vec::new()))
        .collect();

    let mut units_by_testcd: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (source_name, frame) in sources {
        let resolver = ColumnResolver::new(frame, custom_aliases);
        let usubjids = match resolver.resolve("USUBJID") {
            Some(column) => string_values(frame, column),
            None => generate_usubjid_column(frame, &resolver, study_id, usubjid_delimiter)?,
        };

        let carry_values: BTreeMap<String, Vec<Option<String>>> = spec
            .carry_columns
            .iter()
            .map(|(source_col, target)| {
                let values = match resolver.resolve(source_col) {
                    Some(column) => string_values(frame, column),
                    None => vec![None; frame.height()],
                };
                (target.to_uppercase(), values)
            })
            .collect();

        for test in &spec.tests {
            let Some(result_column) = resolver.resolve(&test.result_column) else {
                // This test's column lives in another stacked source.
                continue;
            };
            let results = string_values(frame, result_column);
            let units = match (&test.unit_column, &test.unit_value) {
                (Some(column), _) => match resolver.resolve(column) {
                    Some(resolved) => string_values(frame, resolved),
                    None => vec![None; frame.height()],
                },
                (None, Some(value)) => vec![Some(value.clone()); frame.height()],
                (None, None) => vec![None; frame.height()],
            };
            let read_optional = |column: &Option<String>| -> Vec<Option<String>> {
                column
                    .as_deref()
                    .and_then(|c| resolver.resolve(c))
                    .map(|c| string_values(frame, c))
                    .unwrap_or_else(|| vec![None; frame.height()])
            };
            let lows = read_optional(&test.range_low_column);
            let highs = read_optional(&test.range_high_column);

            for idx in 0..frame.height() {
                let Some(result) = results.get(idx).cloned().flatten() else {
                    // No measurement for this test on this row.
                    continue;
                };

                usubjid_out.push(usubjids.get(idx).cloned().flatten());
                testcd_out.push(Some(test.testcd.to_uppercase()));
                test_out.push(Some(test.test.clone()));
                orres_out.push(Some(result));
                let unit = units.get(idx).cloned().flatten();
                if let Some(unit) = &unit {
                    units_by_testcd
                        .entry(test.testcd.to_uppercase())
                        .or_default()
                        .insert(unit.clone());
                }
                orresu_out.push(unit);
                ornrlo_out.push(lows.get(idx).cloned().flatten());
                ornrhi_out.push(highs.get(idx).cloned().flatten());
                for (target, values) in &carry_values {
                    if let Some(out) = carry_out.get_mut(target) {
                        out.push(values.get(idx).cloned().flatten());
                    }
                }
            }
        }

        info!(
            domain = %spec.domain,
            source = source_name,
            rows = frame.height(),
            "stacked findings source"
        );
    }

    for (testcd, units) in &units_by_testcd {
        if units.len() > 1 {
            let message = format!(
                "inconsistent units for {prefix}TESTCD={testcd}: {}",
                units.iter().cloned().collect::<Vec<_>>().join(", ")
            );
            warn!("{message}");
            warnings.push(message);
        }
    }

    let height = usubjid_out.len();
    let stresc: Vec<Option<String>> = orres_out.clone();
    let stresn: Vec<Option<f64>> = orres_out
        .iter()
        .map(|opt| opt.as_deref().and_then(|v| v.trim().parse::<f64>().ok()))
        .collect();
    let stresu = orresu_out.clone();

    let mut columns = vec![
        Column::new("USUBJID".into(), usubjid_out),
        Column::new(format!("{prefix}TESTCD").into(), testcd_out),
        Column::new(format!("{prefix}TEST").into(), test_out),
        Column::new(format!("{prefix}ORRES").into(), orres_out),
        Column::new(format!("{prefix}ORRESU").into(), orresu_out),
        Column::new(format!("{prefix}STRESC").into(), stresc),
        Column::new(format!("{prefix}STRESN").into(), stresn),
        Column::new(format!("{prefix}STRESU").into(), stresu),
        Column::new(format!("{prefix}ORNRLO").into(), ornrlo_out),
        Column::new(format!("{prefix}ORNRHI").into(), ornrhi_out),
    ];
    for (target, values) in carry_out {
        let mut values = values;
        values.resize(height, None);
        columns.push(Column::new(target.into(), values));
    }

    let data = DataFrame::new(columns)?;
    let mut frame = DomainFrame::new(spec.domain.clone(), data);
    frame.warnings = warnings;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn transpose_spec() -> TransposeSpec {
        TransposeSpec {
            domain: "LB".to_string(),
            carry_columns: BTreeMap::from([("VISIT".to_string(), "VISIT".to_string())]),
            tests: vec![
                TransposeTest {
                    testcd: "GLUC".to_string(),
                    test: "Glucose".to_string(),
                    result_column: "GLUC_RES".to_string(),
                    unit_column: Some("GLUC_U".to_string()),
                    unit_value: None,
                    range_low_column: None,
                    range_high_column: None,
                },
                TransposeTest {
                    testcd: "HGB".to_string(),
                    test: "Hemoglobin".to_string(),
                    result_column: "HGB_RES".to_string(),
                    unit_column: Some("HGB_U".to_string()),
                    unit_value: None,
                    range_low_column: None,
                    range_high_column: None,
                },
            ],
        }
    }

    #[test]
    fn stacks_sources_and_unpivots() {
        let biochem = df! {
            "Subject" => ["01", "02"],
            "SiteNumber" => ["001", "001"],
            "VISIT" => ["VISIT 1", "VISIT 1"],
            "GLUC_RES" => [Some("5.4"), None],
            "GLUC_U" => ["mmol/L", "mmol/L"],
        }
        .unwrap();
        let hem = df! {
            "Subject" => ["01"],
            "SiteNumber" => ["001"],
            "VISIT" => ["VISIT 1"],
            "HGB_RES" => ["13.2"],
            "HGB_U" => ["g/dL"],
        }
        .unwrap();

        let frame = execute_findings(
            &transpose_spec(),
            &[("lb_biochem", &biochem), ("lb_hem", &hem)],
            "301",
            "-",
            &BTreeMap::new(),
        )
        .unwrap();

        // One GLUC row (subject 02 has no result) plus one HGB row.
        assert_eq!(frame.record_count(), 2);
        let testcd = frame.data.column("LBTESTCD").unwrap();
        let codes: Vec<String> = (0..2)
            .map(|i| testcd.get(i).unwrap().to_string().replace('"', ""))
            .collect();
        assert!(codes.contains(&"GLUC".to_string()));
        assert!(codes.contains(&"HGB".to_string()));
        assert!(frame.data.column("LBSTRESN").is_ok());
        assert!(frame.warnings.is_empty());
    }

    #[test]
    fn divergent_units_warn() {
        let a = df! {
            "Subject" => ["01"],
            "SiteNumber" => ["001"],
            "VISIT" => ["VISIT 1"],
            "GLUC_RES" => ["5.4"],
            "GLUC_U" => ["mmol/L"],
        }
        .unwrap();
        let b = df! {
            "Subject" => ["02"],
            "SiteNumber" => ["001"],
            "VISIT" => ["VISIT 1"],
            "GLUC_RES" => ["97.0"],
            "GLUC_U" => ["mg/dL"],
        }
        .unwrap();

        let frame = execute_findings(
            &transpose_spec(),
            &[("lb_biochem", &a), ("lb_biochem2", &b)],
            "301",
            "-",
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(frame.warnings.len(), 1);
        assert!(frame.warnings[0].contains("GLUC"));
    }
}
