//! CONSISTENCY rules: cross-domain checks over the whole frame map.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::DataFrame;

use astraea_model::{RuleCategory, RuleResult, Severity};
use astraea_transform::parse_iso_date;

use crate::util::{actual_column, column_strings, finding};

/// ASTR-C001: every non-DM USUBJID must exist in DM.
pub fn usubjid_in_dm(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let Some(dm) = frames.get("DM") else {
        return Vec::new(); // DM presence is FDA-TRC-1736's job.
    };
    let dm_ids: BTreeSet<String> = column_strings(dm, "USUBJID").into_iter().flatten().collect();

    let mut results = Vec::new();
    for (domain, frame) in frames {
        if domain == "DM" {
            continue;
        }
        let Some(column) = actual_column(frame, "USUBJID") else {
            continue;
        };
        let mut orphans: Vec<String> = Vec::new();
        let mut affected = 0u64;
        for id in column_strings(frame, column).into_iter().flatten() {
            if !dm_ids.contains(&id) {
                affected += 1;
                if !orphans.contains(&id) {
                    orphans.push(id);
                }
            }
        }
        if affected > 0 {
            let examples: Vec<&str> = orphans.iter().take(5).map(String::as_str).collect();
            let mut result = finding(
                "ASTR-C001",
                "Every subject must exist in Demographics",
                RuleCategory::Consistency,
                Severity::Error,
                Some(domain),
                Some("USUBJID"),
                format!("{affected} record(s) reference subjects absent from DM: {}", examples.join(", ")),
                affected,
            );
            result.p21_equivalent = Some("SD0069".to_string());
            results.push(result);
        }
    }
    results
}

/// ASTR-C002: one STUDYID across every domain.
pub fn single_studyid(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let mut study_ids: BTreeSet<String> = BTreeSet::new();
    for frame in frames.values() {
        if let Some(column) = actual_column(frame, "STUDYID") {
            study_ids.extend(column_strings(frame, column).into_iter().flatten());
        }
    }
    if study_ids.len() <= 1 {
        return Vec::new();
    }
    vec![finding(
        "ASTR-C002",
        "A submission carries exactly one STUDYID",
        RuleCategory::Consistency,
        Severity::Error,
        None,
        Some("STUDYID"),
        format!(
            "Multiple STUDYID values: {}",
            study_ids.into_iter().collect::<Vec<_>>().join(", ")
        ),
        0,
    )]
}

/// ASTR-C003: DM.RFSTDTC equals the subject's earliest EXSTDTC.
pub fn rfstdtc_matches_first_exposure(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let (Some(dm), Some(ex)) = (frames.get("DM"), frames.get("EX")) else {
        return Vec::new();
    };
    let Some(ex_dtc) = actual_column(ex, "EXSTDTC") else {
        return Vec::new();
    };

    let mut first_exposure: BTreeMap<String, String> = BTreeMap::new();
    let subjects = column_strings(ex, "USUBJID");
    let dates = column_strings(ex, ex_dtc);
    for (subject, date) in subjects.into_iter().zip(dates.into_iter()) {
        let (Some(subject), Some(date)) = (subject, date) else {
            continue;
        };
        if parse_iso_date(&date).is_none() {
            continue;
        }
        first_exposure
            .entry(subject)
            .and_modify(|existing| {
                if date < *existing {
                    *existing = date.clone();
                }
            })
            .or_insert(date);
    }

    let dm_subjects = column_strings(dm, "USUBJID");
    let dm_starts = column_strings(dm, "RFSTDTC");
    let mut mismatches = 0u64;
    for (subject, start) in dm_subjects.into_iter().zip(dm_starts.into_iter()) {
        let (Some(subject), Some(start)) = (subject, start) else {
            continue;
        };
        if let Some(expected) = first_exposure.get(&subject)
            && *expected != start
        {
            mismatches += 1;
        }
    }

    if mismatches == 0 {
        return Vec::new();
    }
    vec![finding(
        "ASTR-C003",
        "RFSTDTC should equal the first exposure date",
        RuleCategory::Consistency,
        Severity::Warning,
        Some("DM"),
        Some("RFSTDTC"),
        format!("{mismatches} subject(s) where RFSTDTC != min EXSTDTC"),
        mismatches,
    )]
}

/// ASTR-C004: the DOMAIN column matches the dataset's domain code.
pub fn domain_codes_match(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let mut results = Vec::new();
    for (domain, frame) in frames {
        if domain.starts_with("SUPP") {
            continue; // SUPPQUAL uses RDOMAIN.
        }
        let Some(column) = actual_column(frame, "DOMAIN") else {
            continue;
        };
        let mismatches = column_strings(frame, column)
            .into_iter()
            .flatten()
            .filter(|value| value != domain)
            .count() as u64;
        if mismatches > 0 {
            results.push(finding(
                "ASTR-C004",
                "DOMAIN column must match the dataset domain",
                RuleCategory::Consistency,
                Severity::Error,
                Some(domain),
                Some("DOMAIN"),
                format!("{mismatches} row(s) with a different DOMAIN value"),
                mismatches,
            ));
        }
    }
    results
}

/// ASTR-C005: the sign of every --DY agrees with its date vs RFSTDTC.
pub fn study_day_signs(frames: &BTreeMap<String, DataFrame>) -> Vec<RuleResult> {
    let Some(dm) = frames.get("DM") else {
        return Vec::new();
    };
    let mut reference: BTreeMap<String, String> = BTreeMap::new();
    let subjects = column_strings(dm, "USUBJID");
    let starts = column_strings(dm, "RFSTDTC");
    for (subject, start) in subjects.into_iter().zip(starts.into_iter()) {
        if let (Some(subject), Some(start)) = (subject, start) {
            reference.insert(subject, start);
        }
    }

    let mut results = Vec::new();
    for (domain, frame) in frames {
        for dy_column in frame
            .get_column_names()
            .iter()
            .filter(|name| name.to_uppercase().ends_with("DY"))
        {
            let dtc_column = dy_column.to_uppercase().replace("DY", "DTC");
            let Some(dtc_actual) = actual_column(frame, &dtc_column) else {
                continue;
            };

            let subjects = column_strings(frame, "USUBJID");
            let dates = column_strings(frame, dtc_actual);
            let days = column_strings(frame, dy_column.as_str());

            let mut wrong = 0u64;
            for ((subject, date), day) in subjects.iter().zip(dates.iter()).zip(days.iter()) {
                let (Some(subject), Some(date), Some(day)) = (subject, date, day) else {
                    continue;
                };
                let Some(start) = reference.get(subject) else {
                    continue;
                };
                let (Some(date), Some(start)) = (parse_iso_date(date), parse_iso_date(start))
                else {
                    continue;
                };
                let Ok(day) = day.parse::<f64>() else { continue };
                let expected_negative = date < start;
                if (day < 0.0) != expected_negative || day == 0.0 {
                    wrong += 1;
                }
            }
            if wrong > 0 {
                results.push(finding(
                    "ASTR-C005",
                    "Study-day sign must agree with the date versus RFSTDTC",
                    RuleCategory::Consistency,
                    Severity::Warning,
                    Some(domain),
                    Some(dy_column.as_str()),
                    format!("{wrong} study-day value(s) with an impossible sign"),
                    wrong,
                ));
            }
        }
    }
    results
}
