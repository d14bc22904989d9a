//! Standard derived variables: --SEQ, --DY, EPOCH, VISITNUM.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};

use crate::datetime::parse_iso_date;
use crate::error::TransformError;
use crate::handlers::string_values;

/// One trial-design element window, as configured from the study's
/// TA/SE design: an epoch name and the date range it spans.
#[derive(Debug, Clone)]
pub struct EpochWindow {
    /// EPOCH value (e.g. "SCREENING", "TREATMENT").
    pub epoch: String,

    /// First day of the element.
    pub start: NaiveDate,

    /// Last day of the element; an open end runs to the study end.
    pub end: Option<NaiveDate>,
}

impl EpochWindow {
    fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && self.end.is_none_or(|end| date <= end)
    }
}

/// Assign 1-based sequence numbers within each group, in row order.
///
/// Rows with a missing group value receive no sequence number.
pub fn assign_sequence_numbers(
    df: &mut DataFrame,
    seq_column: &str,
    group_column: &str,
) -> Result<(), TransformError> {
    let groups = string_values(df, group_column);
    let mut counters: BTreeMap<String, i64> = BTreeMap::new();

    let values: Vec<Option<f64>> = groups
        .iter()
        .map(|group| {
            group.as_ref().map(|key| {
                let counter = counters.entry(key.clone()).or_insert(0);
                *counter += 1;
                *counter as f64
            })
        })
        .collect();

    df.with_column(Column::new(seq_column.into(), values))?;
    Ok(())
}

/// Compute a study-day column from a --DTC column and per-subject
/// reference start dates (RFSTDTC).
///
/// Day 1 is the day of RFSTDTC; the day before is -1. Zero is never
/// emitted: dates on or after the reference add one.
pub fn compute_study_day(
    df: &mut DataFrame,
    dtc_column: &str,
    dy_column: &str,
    reference_starts: &BTreeMap<String, NaiveDate>,
) -> Result<(), TransformError> {
    let subjects = string_values(df, "USUBJID");
    let dates = string_values(df, dtc_column);

    let values: Vec<Option<f64>> = subjects
        .iter()
        .zip(dates.iter())
        .map(|(subject, dtc)| {
            let reference = subject.as_deref().and_then(|s| reference_starts.get(s))?;
            let date = dtc.as_deref().and_then(parse_iso_date)?;
            let diff = (date - *reference).num_days();
            Some(if diff >= 0 { (diff + 1) as f64 } else { diff as f64 })
        })
        .collect();

    df.with_column(Column::new(dy_column.into(), values))?;
    Ok(())
}

/// Extract per-subject reference start dates from an executed DM frame.
pub fn reference_starts_from_dm(dm: &DataFrame) -> BTreeMap<String, NaiveDate> {
    let subjects = string_values(dm, "USUBJID");
    let starts = string_values(dm, "RFSTDTC");
    subjects
        .into_iter()
        .zip(starts)
        .filter_map(|(subject, start)| {
            Some((subject?, start.as_deref().and_then(parse_iso_date)?))
        })
        .collect()
}

/// Assign EPOCH by placing each record's date into a trial-design
/// element window.
///
/// Windows are checked in order; the first containing window wins, and
/// rows whose date is missing or outside every window stay NULL.
pub fn derive_epoch(
    df: &mut DataFrame,
    dtc_column: &str,
    epoch_column: &str,
    windows: &[EpochWindow],
) -> Result<(), TransformError> {
    let dates = string_values(df, dtc_column);

    let values: Vec<Option<String>> = dates
        .iter()
        .map(|dtc| {
            let date = dtc.as_deref().and_then(parse_iso_date)?;
            windows
                .iter()
                .find(|w| w.contains(date))
                .map(|w| w.epoch.clone())
        })
        .collect();

    df.with_column(Column::new(epoch_column.into(), values))?;
    Ok(())
}

/// Derive VISITNUM from a VISIT column.
///
/// Numeric text in the visit name wins ("VISIT 3" is 3); otherwise a
/// fixed lookup covers the protocol-standard unnumbered visits.
pub fn derive_visitnum(
    df: &mut DataFrame,
    visit_column: &str,
    visitnum_column: &str,
) -> Result<(), TransformError> {
    let visits = string_values(df, visit_column);

    let values: Vec<Option<f64>> = visits
        .iter()
        .map(|visit| visit.as_deref().and_then(visit_number))
        .collect();

    df.with_column(Column::new(visitnum_column.into(), values))?;
    Ok(())
}

fn visit_number(visit: &str) -> Option<f64> {
    let trimmed = visit.trim();
    let digits: String = trimmed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !digits.is_empty()
        && let Ok(number) = digits.parse::<f64>()
    {
        return Some(number);
    }

    match trimmed.to_uppercase().as_str() {
        "SCREENING" => Some(1.0),
        "BASELINE" => Some(2.0),
        "FOLLOW-UP" | "FOLLOW UP" => Some(99.0),
        "UNSCHEDULED" => None,
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn sequence_numbers_are_one_based_per_subject() {
        let mut df = df! {
            "USUBJID" => ["S-1", "S-1", "S-2", "S-1"],
        }
        .unwrap();
        assign_sequence_numbers(&mut df, "AESEQ", "USUBJID").unwrap();

        let seq = df.column("AESEQ").unwrap();
        let values: Vec<f64> = (0..df.height())
            .map(|i| seq.get(i).unwrap().try_extract::<f64>().unwrap())
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 3.0]);
    }

    #[test]
    fn study_day_skips_zero() {
        let mut df = df! {
            "USUBJID" => ["S-1", "S-1", "S-1", "S-2"],
            "AESTDTC" => ["2022-03-30", "2022-03-29", "2022-04-02", "2022-03-30"],
        }
        .unwrap();
        let mut refs = BTreeMap::new();
        refs.insert(
            "S-1".to_string(),
            NaiveDate::from_ymd_opt(2022, 3, 30).unwrap(),
        );

        compute_study_day(&mut df, "AESTDTC", "AESTDY", &refs).unwrap();
        let dy = df.column("AESTDY").unwrap();
        assert_eq!(dy.get(0).unwrap().try_extract::<f64>().unwrap(), 1.0);
        assert_eq!(dy.get(1).unwrap().try_extract::<f64>().unwrap(), -1.0);
        assert_eq!(dy.get(2).unwrap().try_extract::<f64>().unwrap(), 4.0);
        // Subject without a reference date stays null.
        assert_eq!(dy.get(3).unwrap(), polars::prelude::AnyValue::Null);
    }

    #[test]
    fn epoch_from_element_windows() {
        let mut df = df! {
            "AESTDTC" => [
                Some("2022-03-15"),
                Some("2022-04-10"),
                Some("2022-09-01"),
                None,
            ],
        }
        .unwrap();
        let windows = vec![
            EpochWindow {
                epoch: "SCREENING".to_string(),
                start: NaiveDate::from_ymd_opt(2022, 3, 1).unwrap(),
                end: NaiveDate::from_ymd_opt(2022, 3, 29),
            },
            EpochWindow {
                epoch: "TREATMENT".to_string(),
                start: NaiveDate::from_ymd_opt(2022, 3, 30).unwrap(),
                end: NaiveDate::from_ymd_opt(2022, 6, 30),
            },
            EpochWindow {
                epoch: "FOLLOW-UP".to_string(),
                start: NaiveDate::from_ymd_opt(2022, 7, 1).unwrap(),
                end: None,
            },
        ];

        derive_epoch(&mut df, "AESTDTC", "EPOCH", &windows).unwrap();
        let epoch = df.column("EPOCH").unwrap();
        let text = |i: usize| epoch.get(i).unwrap().to_string().replace('"', "");
        assert_eq!(text(0), "SCREENING");
        assert_eq!(text(1), "TREATMENT");
        // Open-ended final window catches late dates.
        assert_eq!(text(2), "FOLLOW-UP");
        assert_eq!(epoch.get(3).unwrap(), polars::prelude::AnyValue::Null);
    }

    #[test]
    fn visitnum_prefers_embedded_numbers() {
        let mut df = df! {
            "VISIT" => ["VISIT 1", "Visit 12", "SCREENING", "Unscheduled"],
        }
        .unwrap();
        derive_visitnum(&mut df, "VISIT", "VISITNUM").unwrap();
        let num = df.column("VISITNUM").unwrap();
        assert_eq!(num.get(0).unwrap().try_extract::<f64>().unwrap(), 1.0);
        assert_eq!(num.get(1).unwrap().try_extract::<f64>().unwrap(), 12.0);
        assert_eq!(num.get(2).unwrap().try_extract::<f64>().unwrap(), 1.0);
        assert_eq!(num.get(3).unwrap(), polars::prelude::AnyValue::Null);
    }
}
