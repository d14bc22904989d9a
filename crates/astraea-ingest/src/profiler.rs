//! Dataset profiler: per-variable statistics, EDC-column tagging, and date
//! detection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use polars::prelude::{AnyValue, DataFrame};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use astraea_model::{DatasetProfile, VariableProfile};

use crate::discovery::discover_datasets;
use crate::error::Result;
use crate::table::{RawTable, load_raw_table};

/// EDC system columns, matched case-insensitively. These are operational
/// columns the EDC export adds around the clinical data.
const EDC_COLUMNS: &[&str] = &[
    "projectid",
    "project",
    "studyid",
    "environmentname",
    "subjectid",
    "subject",
    "sitenumber",
    "siteid",
    "sitegroup",
    "site",
    "studyenvsitenumber",
    "instanceid",
    "instancename",
    "instancerepeatnumber",
    "folderid",
    "folder",
    "foldername",
    "folderseq",
    "targetdays",
    "datapageid",
    "datapagename",
    "pagerepeatnumber",
    "recorddate",
    "recordid",
    "recordposition",
    "mincreated",
    "maxupdated",
    "savets",
    "projectname",
];

/// Source format tags that mark a column as a date/time.
const DATE_FORMAT_TAGS: &[&str] = &[
    "DATE", "DATETIME", "TIME", "DDMMYY", "MMDDYY", "YYMMDD", "IS8601DA", "E8601DA",
];

/// Maximum distinct values for which a top-value distribution is recorded.
const TOP_VALUE_UNIQUE_LIMIT: usize = 100;

/// Sample size for string-based date sniffing.
const DATE_SAMPLE_SIZE: usize = 20;

/// Fraction of sampled values that must look like dates.
const DATE_SAMPLE_THRESHOLD: f64 = 0.6;

/// Study profile summary, including files the profiler had to skip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileSummary {
    /// Profiled dataset names.
    pub profiled: Vec<String>,

    /// Files skipped with the reason, one warning entry each.
    pub skipped: Vec<(String, String)>,
}

/// Date formats the profiler can recognize by sampling, with their names.
fn date_format_patterns() -> Vec<(&'static str, Regex)> {
    [
        ("DD Mon YYYY", r"^\d{1,2} [A-Za-z]{3} \d{4}$"),
        ("DDMonYYYY", r"^\d{1,2}[A-Za-z]{3}\d{4}$"),
        ("YYYY-MM-DD", r"^\d{4}-\d{2}-\d{2}$"),
        ("DD-Mon-YYYY", r"^\d{1,2}-[A-Za-z]{3}-\d{4}$"),
        ("DD/MM/YYYY", r"^\d{1,2}/\d{1,2}/\d{4}$"),
        ("Mon YYYY", r"^[A-Za-z]{3} \d{4}$"),
        ("YYYY", r"^\d{4}$"),
    ]
    .into_iter()
    .map(|(name, pattern)| {
        // The patterns are fixed strings; compilation cannot fail.
        (name, Regex::new(pattern).unwrap_or_else(|_| unreachable!()))
    })
    .collect()
}

/// Profile one raw table.
pub fn profile_dataset(table: &RawTable) -> DatasetProfile {
    let patterns = date_format_patterns();
    let height = table.data.height();

    let mut edc_columns = BTreeSet::new();
    let mut date_variables = Vec::new();
    let mut variables = Vec::new();

    for meta in &table.metadata {
        let lower = meta.name.to_lowercase();
        let is_edc = EDC_COLUMNS.contains(&lower.as_str());
        if is_edc {
            edc_columns.insert(lower.clone());
        }

        let values = column_values(&table.data, &meta.name);
        let n_missing = values.iter().filter(|v| v.is_none()).count();
        let missing_pct = if height == 0 {
            0.0
        } else {
            n_missing as f64 * 100.0 / height as f64
        };

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        let mut sample_values: Vec<String> = Vec::new();
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for value in values.iter().flatten() {
            *counts.entry(value.as_str()).or_insert(0) += 1;
            if seen.insert(value.as_str()) && sample_values.len() < 10 {
                sample_values.push(value.clone());
            }
        }
        let n_unique = seen.len();

        let top_values = if n_unique > 0 && n_unique <= TOP_VALUE_UNIQUE_LIMIT {
            let mut pairs: Vec<(String, usize)> = counts
                .into_iter()
                .map(|(v, c)| (v.to_string(), c))
                .collect();
            pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            pairs.truncate(5);
            pairs
        } else {
            Vec::new()
        };

        let tagged_date = meta
            .format
            .as_deref()
            .map(|f| {
                let upper = f.trim().to_uppercase();
                DATE_FORMAT_TAGS.iter().any(|tag| upper.starts_with(tag))
            })
            .unwrap_or(false);

        let mut detected_date_format = None;
        let is_date = if tagged_date {
            true
        } else if is_raw_date_candidate(&meta.name) {
            detected_date_format = sniff_date_format(&values, &patterns);
            detected_date_format.is_some()
        } else {
            false
        };

        if is_date && !is_edc {
            date_variables.push(meta.name.clone());
        }

        variables.push(VariableProfile {
            metadata: meta.clone(),
            n_missing,
            missing_pct,
            n_unique,
            sample_values,
            top_values,
            is_date,
            detected_date_format: detected_date_format.map(str::to_string),
        });
    }

    DatasetProfile {
        filename: table.filename.clone(),
        dataset_name: table.name.clone(),
        row_count: height,
        col_count: table.data.width(),
        variables,
        edc_columns,
        date_variables,
    }
}

/// Profile every dataset in a study directory.
///
/// Unreadable files are skipped with a warning entry in the summary; they
/// never abort the run.
pub fn profile_study(dir: &Path) -> Result<(Vec<DatasetProfile>, ProfileSummary)> {
    let mut profiles = Vec::new();
    let mut summary = ProfileSummary::default();

    for discovered in discover_datasets(dir)? {
        match load_raw_table(&discovered.path) {
            Ok(table) => {
                summary.profiled.push(table.name.clone());
                profiles.push(profile_dataset(&table));
            }
            Err(err) => {
                warn!(file = %discovered.path.display(), error = %err, "skipping unreadable file");
                summary
                    .skipped
                    .push((discovered.name.clone(), err.to_string()));
            }
        }
    }

    Ok((profiles, summary))
}

/// `*_RAW` columns whose name mentions DAT are candidates for date sniffing.
fn is_raw_date_candidate(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.ends_with("_RAW") && upper.contains("DAT")
}

fn sniff_date_format<'a>(
    values: &[Option<String>],
    patterns: &[(&'a str, Regex)],
) -> Option<&'a str> {
    let sample: Vec<&str> = values
        .iter()
        .flatten()
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
        .take(DATE_SAMPLE_SIZE)
        .collect();
    if sample.is_empty() {
        return None;
    }

    for (name, regex) in patterns {
        let matches = sample.iter().filter(|v| regex.is_match(v.trim())).count();
        if matches as f64 / sample.len() as f64 >= DATE_SAMPLE_THRESHOLD {
            return Some(name);
        }
    }
    None
}

fn column_values(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    let Ok(series) = df.column(column) else {
        return vec![None; df.height()];
    };
    (0..df.height())
        .map(|idx| match series.get(idx).unwrap_or(AnyValue::Null) {
            AnyValue::Null => None,
            AnyValue::String(s) if s.trim().is_empty() => None,
            AnyValue::StringOwned(ref s) if s.trim().is_empty() => None,
            AnyValue::String(s) => Some(s.to_string()),
            AnyValue::StringOwned(s) => Some(s.to_string()),
            other => Some(other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{VariableMetadata, VariableType};
    use polars::df;

    fn table() -> RawTable {
        let data = df! {
            "Subject" => ["001", "002", "003"],
            "projectid" => ["P1", "P1", "P1"],
            "VISDAT_RAW" => ["12 Mar 2022", "01 Apr 2022", "15 Apr 2022"],
            "SEX" => ["M", "F", ""],
        }
        .unwrap();
        let metadata = vec![
            VariableMetadata {
                name: "Subject".into(),
                label: Some("Subject".into()),
                format: None,
                dtype: VariableType::Char,
                width: 10,
            },
            VariableMetadata {
                name: "projectid".into(),
                label: None,
                format: None,
                dtype: VariableType::Char,
                width: 10,
            },
            VariableMetadata {
                name: "VISDAT_RAW".into(),
                label: Some("Visit Date".into()),
                format: None,
                dtype: VariableType::Char,
                width: 12,
            },
            VariableMetadata {
                name: "SEX".into(),
                label: Some("Sex".into()),
                format: None,
                dtype: VariableType::Char,
                width: 1,
            },
        ];
        RawTable {
            name: "dm".into(),
            filename: "dm.csv".into(),
            data,
            metadata,
        }
    }

    #[test]
    fn tags_edc_columns() {
        let profile = profile_dataset(&table());
        assert!(profile.edc_columns.contains("projectid"));
        assert_eq!(profile.clinical_columns().len(), 3);
    }

    #[test]
    fn sniffs_raw_date_columns() {
        let profile = profile_dataset(&table());
        assert_eq!(profile.date_variables, vec!["VISDAT_RAW"]);
        let var = profile.variable("VISDAT_RAW").unwrap();
        assert!(var.is_date);
        assert_eq!(var.detected_date_format.as_deref(), Some("DD Mon YYYY"));
    }

    #[test]
    fn counts_missing_and_uniques() {
        let profile = profile_dataset(&table());
        let sex = profile.variable("SEX").unwrap();
        assert_eq!(sex.n_missing, 1);
        assert_eq!(sex.n_unique, 2);
        assert!((sex.missing_pct - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(sex.top_values.len(), 2);
    }

    #[test]
    fn format_tag_marks_dates() {
        let mut t = table();
        t.metadata[3].format = Some("DATETIME20.".into());
        let profile = profile_dataset(&t);
        assert!(profile.variable("SEX").unwrap().is_date);
    }
}
