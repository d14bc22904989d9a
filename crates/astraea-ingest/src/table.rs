//! The raw-table contract with the transport-format reader.

use std::path::Path;

use polars::prelude::{CsvReadOptions, DataFrame, SerReader};
use serde::Deserialize;
use tracing::debug;

use astraea_model::{VariableMetadata, VariableType};

use crate::error::{IngestError, Result};

/// One raw dataset as delivered by the external reader: tabular data plus
/// the source variable attributes the binary format carried.
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Dataset name: the filename stem, lowercased.
    pub name: String,

    /// Source filename (no directory).
    pub filename: String,

    /// The tabular data.
    pub data: DataFrame,

    /// Source variable attributes, in column order.
    pub metadata: Vec<VariableMetadata>,
}

impl RawTable {
    /// Source metadata for a column (case-insensitive).
    pub fn metadata_for(&self, column: &str) -> Option<&VariableMetadata> {
        self.metadata
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(column.trim()))
    }
}

/// Sidecar metadata format: one entry per column.
#[derive(Debug, Deserialize)]
struct SidecarEntry {
    name: String,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    dtype: Option<String>,
    #[serde(default)]
    width: Option<u32>,
}

/// Load one raw table from the reader's CSV interchange.
///
/// The CSV carries the data; an optional `<stem>.meta.json` sidecar carries
/// the source attributes (labels, format tags, storage types). When the
/// sidecar is absent, metadata is inferred from the DataFrame schema.
pub fn load_raw_table(path: &Path) -> Result<RawTable> {
    let data = read_csv(path)?;

    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    let name = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_lowercase();

    let sidecar_path = path.with_extension("meta.json");
    let metadata = if sidecar_path.is_file() {
        read_sidecar(&sidecar_path, &data)?
    } else {
        infer_metadata(&data)
    };

    debug!(dataset = %name, rows = data.height(), cols = data.width(), "raw table loaded");

    Ok(RawTable {
        name,
        filename,
        data,
        metadata,
    })
}

fn read_csv(path: &Path) -> Result<DataFrame> {
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(100))
        .with_ignore_errors(true)
        .try_into_reader_with_file_path(Some(path.into()))
        .map_err(|e| IngestError::TableParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::TableParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    // Trim header whitespace left behind by EDC exports.
    let trimmed: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.trim().to_string())
        .collect();
    df.set_column_names(&trimmed)
        .map_err(|e| IngestError::TableParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(df)
}

fn read_sidecar(path: &Path, data: &DataFrame) -> Result<Vec<VariableMetadata>> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<SidecarEntry> =
        serde_json::from_str(&text).map_err(|source| IngestError::MetadataParse {
            path: path.to_path_buf(),
            source,
        })?;

    let mut metadata: Vec<VariableMetadata> = entries
        .into_iter()
        .map(|e| VariableMetadata {
            dtype: e
                .dtype
                .as_deref()
                .and_then(|d| d.parse().ok())
                .unwrap_or(VariableType::Char),
            width: e.width.unwrap_or(1).max(1),
            name: e.name,
            label: e.label,
            format: e.format,
        })
        .collect();

    // Columns present in the data but absent from the sidecar still get
    // inferred entries, so the profiler sees every column.
    for column in data.get_columns() {
        if !metadata
            .iter()
            .any(|m| m.name.eq_ignore_ascii_case(column.name()))
        {
            metadata.push(infer_column(column.name(), column.dtype().is_primitive_numeric()));
        }
    }

    Ok(metadata)
}

fn infer_metadata(data: &DataFrame) -> Vec<VariableMetadata> {
    data.get_columns()
        .iter()
        .map(|c| infer_column(c.name(), c.dtype().is_primitive_numeric()))
        .collect()
}

fn infer_column(name: &str, numeric: bool) -> VariableMetadata {
    VariableMetadata {
        name: name.to_string(),
        label: None,
        format: None,
        dtype: if numeric {
            VariableType::Num
        } else {
            VariableType::Char
        },
        width: 8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_csv_with_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("dm.csv");
        let mut f = std::fs::File::create(&csv_path).unwrap();
        writeln!(f, "Subject,BRTHDAT_RAW,AGE").unwrap();
        writeln!(f, "001,1985-02-03,40").unwrap();
        writeln!(f, "002,1990-06-07,35").unwrap();

        std::fs::write(
            dir.path().join("dm.meta.json"),
            r#"[
                {"name": "Subject", "label": "Subject Identifier", "dtype": "Char", "width": 10},
                {"name": "BRTHDAT_RAW", "label": "Birth Date", "format": "DATE", "dtype": "Char", "width": 10}
            ]"#,
        )
        .unwrap();

        let table = load_raw_table(&csv_path).unwrap();
        assert_eq!(table.name, "dm");
        assert_eq!(table.data.height(), 2);
        assert_eq!(
            table.metadata_for("subject").unwrap().label.as_deref(),
            Some("Subject Identifier")
        );
        // AGE was missing from the sidecar but must still be profiled.
        assert!(table.metadata_for("AGE").is_some());
    }

    #[test]
    fn infers_metadata_without_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("ae.csv");
        std::fs::write(&csv_path, "AETERM,AESEQ\nHeadache,1\n").unwrap();

        let table = load_raw_table(&csv_path).unwrap();
        assert_eq!(table.metadata.len(), 2);
        assert_eq!(table.metadata_for("AESEQ").unwrap().dtype, VariableType::Num);
    }
}
