//! Study-level profiling and eCRF entities.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::enums::VariableType;

/// Raw-variable attributes extracted from the source dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableMetadata {
    /// Column name as it appears in the raw dataset.
    pub name: String,

    /// Source label, when present.
    #[serde(default)]
    pub label: Option<String>,

    /// Source format tag (e.g., "DATE", "DATETIME", "$CHAR").
    #[serde(default)]
    pub format: Option<String>,

    /// Storage data type.
    pub dtype: VariableType,

    /// Storage width in bytes (≥1).
    pub width: u32,
}

/// Per-variable statistics computed by the profiler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableProfile {
    /// Source metadata for the variable.
    pub metadata: VariableMetadata,

    /// Number of missing (null or blank) values.
    pub n_missing: usize,

    /// Missing values as a percentage of rows.
    pub missing_pct: f64,

    /// Number of distinct non-missing values.
    pub n_unique: usize,

    /// Up to the first 10 distinct values, in order of appearance.
    pub sample_values: Vec<String>,

    /// Top-5 value counts, only when n_unique ≤ 100.
    #[serde(default)]
    pub top_values: Vec<(String, usize)>,

    /// True when the variable holds dates (by format tag or sampling).
    pub is_date: bool,

    /// The date format detected by sampling, when any.
    #[serde(default)]
    pub detected_date_format: Option<String>,
}

/// Profile of one raw dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetProfile {
    /// Source filename (without directory).
    pub filename: String,

    /// Dataset name (filename stem, lowercase).
    pub dataset_name: String,

    /// Number of rows.
    pub row_count: usize,

    /// Number of columns.
    pub col_count: usize,

    /// Per-variable profiles, in source column order.
    pub variables: Vec<VariableProfile>,

    /// Column names recognized as EDC system columns.
    pub edc_columns: BTreeSet<String>,

    /// Column names recognized as dates.
    pub date_variables: Vec<String>,
}

impl DatasetProfile {
    /// Look up a variable profile by name (case-insensitive).
    pub fn variable(&self, name: &str) -> Option<&VariableProfile> {
        self.variables
            .iter()
            .find(|v| v.metadata.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Names of clinical (non-EDC) columns, in source order.
    pub fn clinical_columns(&self) -> Vec<&str> {
        self.variables
            .iter()
            .map(|v| v.metadata.name.as_str())
            .filter(|n| !self.edc_columns.contains(&n.to_lowercase()))
            .collect()
    }
}

/// One annotated field of an eCRF form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcrfField {
    /// Position on the form (1-based).
    pub field_number: u32,

    /// Field name: uppercase, no whitespace.
    pub field_name: String,

    /// Declared data type.
    pub data_type: String,

    /// SAS label for the field.
    pub sas_label: String,

    /// Measurement units, when stated.
    #[serde(default)]
    pub units: Option<String>,

    /// Code → decode map for coded fields.
    #[serde(default)]
    pub coded_values: Option<BTreeMap<String, String>>,

    /// Source OID, when the EDC export carries one.
    #[serde(default)]
    pub field_oid: Option<String>,
}

/// One form of the annotated eCRF.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcrfForm {
    /// Form name as printed on the CRF.
    pub form_name: String,

    /// PDF page numbers the form spans.
    pub page_numbers: Vec<u32>,

    /// Fields in form order.
    pub fields: Vec<EcrfField>,
}

impl EcrfForm {
    /// Look up a field by name (case-insensitive).
    pub fn field(&self, name: &str) -> Option<&EcrfField> {
        self.fields
            .iter()
            .find(|f| f.field_name.eq_ignore_ascii_case(name.trim()))
    }
}
