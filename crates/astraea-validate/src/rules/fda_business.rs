//! FDA business rules.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::DataFrame;

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_standards::ReferenceStore;

use crate::util::{actual_column, column_strings, finding};

/// FDAB057: ETHNIC values conform to C66790.
pub fn ethnic_terms(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    codelist_conformance(domain, df, store, "ETHNIC", "C66790", "FDAB057")
}

/// FDAB055: RACE values conform to C74457.
pub fn race_terms(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    codelist_conformance(domain, df, store, "RACE", "C74457", "FDAB055")
}

fn codelist_conformance(
    domain: &str,
    df: &DataFrame,
    store: &ReferenceStore,
    variable: &str,
    code: &str,
    rule_id: &str,
) -> Result<Vec<RuleResult>, String> {
    let Some(column) = actual_column(df, variable) else {
        return Ok(Vec::new());
    };
    let Some(codelist) = store.lookup_codelist(code) else {
        return Ok(Vec::new());
    };

    let mut bad: Vec<String> = Vec::new();
    let mut affected = 0u64;
    for value in column_strings(df, column).into_iter().flatten() {
        if !codelist.contains(&value) {
            affected += 1;
            if !bad.contains(&value) {
                bad.push(value);
            }
        }
    }
    if affected == 0 {
        return Ok(Vec::new());
    }
    let examples: Vec<&str> = bad.iter().take(5).map(String::as_str).collect();
    Ok(vec![finding(
        rule_id,
        "FDA expects standard terminology for this variable",
        RuleCategory::FdaBusiness,
        Severity::Warning,
        Some(domain),
        Some(variable),
        format!("{affected} value(s) outside {code}: {}", examples.join(", ")),
        affected,
    )])
}

/// FDAB039: reference-range limits should be numeric wherever the
/// standardized numeric result is populated.
pub fn numeric_reference_ranges(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let prefix = domain.to_uppercase();
    let Some(stresn) = actual_column(df, &format!("{prefix}STRESN")) else {
        return Ok(Vec::new());
    };

    let mut results = Vec::new();
    for suffix in ["ORNRLO", "ORNRHI"] {
        let Some(range_column) = actual_column(df, &format!("{prefix}{suffix}")) else {
            continue;
        };
        let stresn_values = column_strings(df, stresn);
        let range_values = column_strings(df, range_column);

        let non_numeric = stresn_values
            .iter()
            .zip(range_values.iter())
            .filter(|(result, range)| {
                result.is_some()
                    && range
                        .as_deref()
                        .is_some_and(|value| value.trim().parse::<f64>().is_err())
            })
            .count() as u64;
        if non_numeric > 0 {
            results.push(finding(
                "FDAB039",
                "Reference ranges should be numeric when results are standardized",
                RuleCategory::FdaBusiness,
                Severity::Warning,
                Some(domain),
                Some(range_column),
                format!("{non_numeric} non-numeric range value(s) with populated {prefix}STRESN"),
                non_numeric,
            ));
        }
    }
    Ok(results)
}

/// FDAB009: --TESTCD and --TEST must map one-to-one.
pub fn testcd_test_bijection(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let prefix = domain.to_uppercase();
    let (Some(testcd), Some(test)) = (
        actual_column(df, &format!("{prefix}TESTCD")),
        actual_column(df, &format!("{prefix}TEST")),
    ) else {
        return Ok(Vec::new());
    };

    let mut by_code: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut by_name: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let codes = column_strings(df, testcd);
    let names = column_strings(df, test);
    for (code, name) in codes.into_iter().zip(names.into_iter()) {
        let (Some(code), Some(name)) = (code, name) else {
            continue;
        };
        by_code.entry(code.clone()).or_default().insert(name.clone());
        by_name.entry(name).or_default().insert(code);
    }

    let mut conflicts: Vec<String> = Vec::new();
    for (code, names) in &by_code {
        if names.len() > 1 {
            conflicts.push(format!(
                "{code} maps to multiple names: {}",
                names.iter().cloned().collect::<Vec<_>>().join(" / ")
            ));
        }
    }
    for (name, codes) in &by_name {
        if codes.len() > 1 {
            conflicts.push(format!(
                "{name:?} maps to multiple codes: {}",
                codes.iter().cloned().collect::<Vec<_>>().join(" / ")
            ));
        }
    }

    if conflicts.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![finding(
        "FDAB009",
        "--TESTCD and --TEST must be one-to-one",
        RuleCategory::FdaBusiness,
        Severity::Error,
        Some(domain),
        Some(&format!("{prefix}TESTCD")),
        conflicts.join("; "),
        conflicts.len() as u64,
    )])
}

/// FDAB030: one standard unit per --TESTCD.
pub fn consistent_standard_units(
    domain: &str,
    df: &DataFrame,
    _store: &ReferenceStore,
) -> Result<Vec<RuleResult>, String> {
    let prefix = domain.to_uppercase();
    let (Some(testcd), Some(stresu)) = (
        actual_column(df, &format!("{prefix}TESTCD")),
        actual_column(df, &format!("{prefix}STRESU")),
    ) else {
        return Ok(Vec::new());
    };

    let mut units: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let codes = column_strings(df, testcd);
    let unit_values = column_strings(df, stresu);
    for (code, unit) in codes.into_iter().zip(unit_values.into_iter()) {
        let (Some(code), Some(unit)) = (code, unit) else {
            continue;
        };
        units.entry(code).or_default().insert(unit);
    }

    let inconsistent: Vec<String> = units
        .iter()
        .filter(|(_, set)| set.len() > 1)
        .map(|(code, set)| {
            format!(
                "{code}: {}",
                set.iter().cloned().collect::<Vec<_>>().join(" / ")
            )
        })
        .collect();
    if inconsistent.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![finding(
        "FDAB030",
        "Standard units must be consistent per test code",
        RuleCategory::FdaBusiness,
        Severity::Warning,
        Some(domain),
        Some(&format!("{prefix}STRESU")),
        inconsistent.join("; "),
        inconsistent.len() as u64,
    )])
}
