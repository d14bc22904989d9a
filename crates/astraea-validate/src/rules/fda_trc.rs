//! FDA Technical Rejection Criteria.
//!
//! These checks mirror the submission-gateway rules that cause automatic
//! rejection; all of them are errors.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use polars::prelude::DataFrame;

use astraea_model::{RuleCategory, RuleResult, Severity};

use crate::util::{actual_column, column_strings, finding};

/// FDA-TRC-1734: a TS dataset must exist and carry the SSTDTC parameter.
pub fn ts_with_study_start(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let Some(ts) = frames.get("TS") else {
        return vec![trc(
            "FDA-TRC-1734",
            "Trial Summary with a Study Start Date parameter is required",
            None,
            "TS dataset is missing".to_string(),
        )];
    };
    let Some(parmcd) = actual_column(ts, "TSPARMCD") else {
        return vec![trc(
            "FDA-TRC-1734",
            "Trial Summary with a Study Start Date parameter is required",
            Some("TS"),
            "TS has no TSPARMCD column".to_string(),
        )];
    };

    let codes = column_strings(ts, parmcd);
    let values = actual_column(ts, "TSVAL")
        .map(|c| column_strings(ts, c))
        .unwrap_or_default();
    let has_sstdtc = codes.iter().enumerate().any(|(idx, code)| {
        code.as_deref() == Some("SSTDTC")
            && values.get(idx).cloned().flatten().is_some()
    });
    if has_sstdtc {
        return Vec::new();
    }
    vec![trc(
        "FDA-TRC-1734",
        "Trial Summary with a Study Start Date parameter is required",
        Some("TS"),
        "TS has no populated SSTDTC parameter".to_string(),
    )]
}

/// FDA-TRC-1735: define.xml must be in the submission package.
pub fn define_xml_present(output_dir: &Path) -> Vec<RuleResult> {
    if output_dir.join("define.xml").is_file() {
        return Vec::new();
    }
    vec![trc(
        "FDA-TRC-1735",
        "define.xml is required in the submission package",
        None,
        "define.xml not found in the output directory".to_string(),
    )]
}

/// FDA-TRC-1736: a DM dataset must be present.
pub fn dm_present(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    if frames.contains_key("DM") {
        return Vec::new();
    }
    vec![trc(
        "FDA-TRC-1736",
        "Demographics is required in every submission",
        None,
        "DM dataset is missing".to_string(),
    )]
}

/// FDA-TRC-STUDYID: STUDYID must be identical everywhere.
pub fn consistent_studyid(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let mut ids: BTreeSet<String> = BTreeSet::new();
    for frame in frames.values() {
        if let Some(column) = actual_column(frame, "STUDYID") {
            ids.extend(column_strings(frame, column).into_iter().flatten());
        }
    }
    if ids.len() <= 1 {
        return Vec::new();
    }
    vec![trc(
        "FDA-TRC-STUDYID",
        "STUDYID must be consistent across the package",
        None,
        format!(
            "STUDYID values differ: {}",
            ids.into_iter().collect::<Vec<_>>().join(", ")
        ),
    )]
}

/// FDA-TRC-FILENAME: every domain file is lowercase `<domain>.xpt`.
pub fn filename_conventions(
    frames: &BTreeMap<String, DataFrame>,
    output_dir: &Path,
) -> Vec<RuleResult> {
    let mut results = Vec::new();
    for domain in frames.keys() {
        let expected = format!("{}.xpt", domain.to_lowercase());
        if !output_dir.join(&expected).is_file() {
            results.push(trc(
                "FDA-TRC-FILENAME",
                "Transport files are lowercase <domain>.xpt",
                Some(domain),
                format!("Expected {expected} in the output directory"),
            ));
        }
    }
    results
}

fn trc(rule_id: &str, description: &str, domain: Option<&str>, message: String) -> RuleResult {
    finding(
        rule_id,
        description,
        RuleCategory::FdaTrc,
        Severity::Error,
        domain,
        None,
        message,
        1,
    )
}
