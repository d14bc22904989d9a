//! Transport-file emission with read-back verification.

use std::path::Path;

use anyhow::{Context, Result, bail};
use polars::prelude::{AnyValue, DataFrame, DataType};
use tracing::info;

use astraea_model::{DomainSpec, VariableType};
use astraea_xpt::{
    XptColumn, XptDataset, XptValue, XptWriterOptions, read_xpt, write_xpt,
};

/// Write a domain frame as `<domain>.xpt` and verify the file on disk.
///
/// Character widths are optimized to the maximum observed value length
/// (minimum 1, never padded up to the reference length). After writing,
/// the file is read back and checked against the frame: a mismatch means
/// the file on disk is corrupt and the error is fatal.
pub fn write_domain_xpt(
    output_dir: &Path,
    domain_spec: &DomainSpec,
    df: &DataFrame,
) -> Result<std::path::PathBuf> {
    let dataset = to_xpt_dataset(domain_spec, df)?;
    let filename = format!("{}.xpt", domain_spec.domain.to_lowercase());
    let path = output_dir.join(&filename);

    write_xpt(&path, &dataset, &XptWriterOptions::default())
        .with_context(|| format!("write {}", path.display()))?;

    verify_written_file(&path, df)?;
    info!(file = %path.display(), rows = df.height(), "transport file written");
    Ok(path)
}

fn to_xpt_dataset(domain_spec: &DomainSpec, df: &DataFrame) -> Result<XptDataset> {
    let mut dataset = XptDataset::new(domain_spec.domain.to_uppercase())
        .with_label(truncate(&domain_spec.label, 40));

    let mut columns = Vec::new();
    let mut extractors: Vec<(String, VariableType)> = Vec::new();

    for name in df.get_column_names() {
        let spec_var = domain_spec.variable(name);
        let data_type = spec_var.map(|v| v.data_type).unwrap_or_else(|| {
            if df
                .column(name)
                .map(|c| c.dtype().is_primitive_numeric())
                .unwrap_or(false)
            {
                VariableType::Num
            } else {
                VariableType::Char
            }
        });
        let label = spec_var.map(|v| truncate(&v.label, 40)).unwrap_or_default();

        let column = match data_type {
            VariableType::Num => XptColumn::numeric(name.to_uppercase()).with_label(label),
            VariableType::Char => {
                let width = max_observed_width(df, name).max(1).min(200) as u16;
                XptColumn::character(name.to_uppercase(), width).with_label(label)
            }
        };
        columns.push(column);
        extractors.push((name.to_string(), data_type));
    }
    dataset.columns = columns;

    for idx in 0..df.height() {
        let mut row = Vec::with_capacity(extractors.len());
        for (name, data_type) in &extractors {
            let value = df
                .column(name)
                .ok()
                .map(|c| c.get(idx).unwrap_or(AnyValue::Null))
                .unwrap_or(AnyValue::Null);
            row.push(to_xpt_value(value, *data_type));
        }
        dataset.rows.push(row);
    }

    Ok(dataset)
}

fn to_xpt_value(value: AnyValue, data_type: VariableType) -> XptValue {
    match data_type {
        VariableType::Num => {
            let numeric = match value {
                AnyValue::Null => None,
                AnyValue::Float64(v) => Some(v),
                AnyValue::Float32(v) => Some(v as f64),
                AnyValue::Int64(v) => Some(v as f64),
                AnyValue::Int32(v) => Some(v as f64),
                AnyValue::String(s) => s.trim().parse().ok(),
                AnyValue::StringOwned(s) => s.trim().parse().ok(),
                _ => None,
            };
            XptValue::Num(numeric)
        }
        VariableType::Char => {
            let text = match value {
                AnyValue::Null => String::new(),
                AnyValue::String(s) => s.to_string(),
                AnyValue::StringOwned(s) => s.to_string(),
                AnyValue::Float64(v) if v.fract() == 0.0 => format!("{}", v as i64),
                other => other.to_string(),
            };
            XptValue::Char(text)
        }
    }
}

fn max_observed_width(df: &DataFrame, column: &str) -> usize {
    let Ok(series) = df.column(column) else {
        return 1;
    };
    if !matches!(series.dtype(), DataType::String) {
        return 8;
    }
    (0..df.height())
        .filter_map(|idx| match series.get(idx).unwrap_or(AnyValue::Null) {
            AnyValue::String(s) => Some(s.len()),
            AnyValue::StringOwned(s) => Some(s.len()),
            _ => None,
        })
        .max()
        .unwrap_or(1)
}

/// Read the file back and compare structure with the source frame.
fn verify_written_file(path: &Path, df: &DataFrame) -> Result<()> {
    let loaded = read_xpt(path).with_context(|| format!("read back {}", path.display()))?;

    if loaded.rows.len() != df.height() {
        bail!(
            "read-back row count mismatch in {}: wrote {}, read {}",
            path.display(),
            df.height(),
            loaded.rows.len()
        );
    }

    let written: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|n| n.to_uppercase())
        .collect();
    let read: Vec<String> = loaded.columns.iter().map(|c| c.name.clone()).collect();
    if written != read {
        bail!(
            "read-back column mismatch in {}: wrote {:?}, read {:?}",
            path.display(),
            written,
            read
        );
    }

    Ok(())
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_standards::ReferenceStore;
    use polars::df;

    #[test]
    fn writes_and_verifies_dm() {
        let store = ReferenceStore::load().unwrap();
        let spec = store.get_domain_spec("DM").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let frame = df! {
            "STUDYID" => ["301", "301"],
            "DOMAIN" => ["DM", "DM"],
            "USUBJID" => ["301-001-01", "301-001-02"],
            "AGE" => [42.0f64, 35.0],
        }
        .unwrap();

        let path = write_domain_xpt(dir.path(), spec, &frame).unwrap();
        assert_eq!(path.file_name().unwrap(), "dm.xpt");

        let loaded = read_xpt(&path).unwrap();
        assert_eq!(loaded.rows.len(), 2);
        assert_eq!(loaded.columns[2].name, "USUBJID");
        // Width optimized to the longest observed value.
        assert_eq!(loaded.columns[2].length, 10);
        assert_eq!(
            loaded.columns[2].label.as_deref(),
            Some("Unique Subject Identifier")
        );
    }
}
