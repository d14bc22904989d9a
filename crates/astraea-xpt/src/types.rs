//! Dataset, column, and value types.

use chrono::NaiveDateTime;

/// Variable type: the transport format has exactly two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XptType {
    /// 8-byte IBM floating point.
    Num,
    /// Fixed-width byte string.
    Char,
}

impl XptType {
    /// NAMESTR ntype code.
    pub(crate) fn to_ntype(self) -> i16 {
        match self {
            Self::Num => 1,
            Self::Char => 2,
        }
    }

    /// Parse a NAMESTR ntype code.
    pub(crate) fn from_ntype(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Num),
            2 => Some(Self::Char),
            _ => None,
        }
    }
}

/// One variable of a dataset.
#[derive(Debug, Clone)]
pub struct XptColumn {
    /// Variable name, ≤8 bytes uppercase.
    pub name: String,

    /// Variable label, ≤40 bytes.
    pub label: Option<String>,

    /// Variable type.
    pub data_type: XptType,

    /// Byte width in the observation record. Numerics are always 8.
    pub length: u16,
}

impl XptColumn {
    /// A numeric column (8 bytes).
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            data_type: XptType::Num,
            length: 8,
        }
    }

    /// A character column with the given width.
    pub fn character(name: impl Into<String>, length: u16) -> Self {
        Self {
            name: name.into(),
            label: None,
            data_type: XptType::Char,
            length,
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum XptValue {
    /// Character data; stored trimmed of the record padding.
    Char(String),

    /// Numeric data; `None` is the standard missing value.
    Num(Option<f64>),
}

impl XptValue {
    /// The value as a display string (missing numerics are empty).
    pub fn as_display(&self) -> String {
        match self {
            Self::Char(s) => s.clone(),
            Self::Num(Some(n)) => n.to_string(),
            Self::Num(None) => String::new(),
        }
    }
}

/// A single-member transport dataset.
#[derive(Debug, Clone)]
pub struct XptDataset {
    /// Dataset name, ≤8 bytes uppercase.
    pub name: String,

    /// Dataset label, ≤40 bytes.
    pub label: Option<String>,

    /// Variables in output order.
    pub columns: Vec<XptColumn>,

    /// Rows; each row has one value per column.
    pub rows: Vec<Vec<XptValue>>,
}

impl XptDataset {
    /// An empty dataset.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Attach a label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Total byte width of one observation record.
    pub fn observation_length(&self) -> usize {
        self.columns.iter().map(|c| c.length as usize).sum()
    }
}

/// Writer options. The timestamps are injectable so output bytes are
/// reproducible across runs.
#[derive(Debug, Clone)]
pub struct XptWriterOptions {
    /// SAS version string recorded in the headers.
    pub sas_version: String,

    /// Operating system string recorded in the headers.
    pub os_name: String,

    /// Created/modified timestamp recorded in the headers.
    pub timestamp: NaiveDateTime,
}

impl Default for XptWriterOptions {
    fn default() -> Self {
        Self {
            sas_version: "9.4".to_string(),
            os_name: "LINUX".to_string(),
            timestamp: chrono::DateTime::from_timestamp(0, 0)
                .map(|dt| dt.naive_utc())
                .unwrap_or_default(),
        }
    }
}

impl XptWriterOptions {
    /// Format the timestamp as the `ddMMMyy:hh:mm:ss` the headers use,
    /// with the uppercase month SAS expects.
    pub(crate) fn format_timestamp(&self) -> String {
        const MONTHS: [&str; 12] = [
            "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
        ];
        use chrono::{Datelike, Timelike};
        let t = &self.timestamp;
        let month = MONTHS[(t.month0() as usize).min(11)];
        format!(
            "{:02}{}{:02}:{:02}:{:02}:{:02}",
            t.day(),
            month,
            t.year() % 100,
            t.hour(),
            t.minute(),
            t.second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_length_sums_widths() {
        let mut ds = XptDataset::new("DM");
        ds.columns = vec![XptColumn::numeric("AGE"), XptColumn::character("SEX", 2)];
        assert_eq!(ds.observation_length(), 10);
    }

    #[test]
    fn timestamp_format_is_sas_style() {
        let options = XptWriterOptions::default();
        assert_eq!(options.format_timestamp(), "01JAN70:00:00:00");
    }
}
