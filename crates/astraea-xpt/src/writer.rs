//! XPT v5 writer.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::XptError;
use crate::float::{encode_missing, ieee_to_ibm};
use crate::header::{
    RECORD_LEN, build_dscrptr_header, build_library_header, build_member_data,
    build_member_header, build_member_second, build_namestr, build_namestr_header,
    build_obs_header, build_real_header, build_second_header,
};
use crate::types::{XptColumn, XptDataset, XptType, XptValue, XptWriterOptions};

/// Write a dataset to an XPT v5 file.
pub fn write_xpt(path: &Path, dataset: &XptDataset, options: &XptWriterOptions) -> crate::Result<()> {
    validate_dataset(dataset)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&build_library_header())?;
    writer.write_all(&build_real_header(options))?;
    writer.write_all(&build_second_header(options))?;

    writer.write_all(&build_member_header())?;
    writer.write_all(&build_dscrptr_header())?;
    writer.write_all(&build_member_data(dataset, options))?;
    writer.write_all(&build_member_second(dataset, options))?;

    writer.write_all(&build_namestr_header(dataset.columns.len()))?;
    let mut records = RecordWriter::new(&mut writer);
    let mut position = 0u32;
    for (idx, column) in dataset.columns.iter().enumerate() {
        records.write_bytes(&build_namestr(column, (idx + 1) as u16, position))?;
        position = position.saturating_add(column.length as u32);
    }
    records.finish()?;

    writer.write_all(&build_obs_header())?;
    let obs_len = dataset.observation_length();
    let mut records = RecordWriter::new(&mut writer);
    for row in &dataset.rows {
        let mut obs = vec![b' '; obs_len];
        let mut pos = 0usize;
        for (value, column) in row.iter().zip(dataset.columns.iter()) {
            let bytes = encode_value(value, column);
            obs[pos..pos + bytes.len()].copy_from_slice(&bytes);
            pos += column.length as usize;
        }
        records.write_bytes(&obs)?;
    }
    records.finish()?;

    writer.flush()?;
    Ok(())
}

/// Pre-write structural validation.
fn validate_dataset(dataset: &XptDataset) -> crate::Result<()> {
    let name = dataset.name.trim();
    if name.is_empty() || name.len() > 8 {
        return Err(XptError::InvalidDatasetName(dataset.name.clone()));
    }

    let mut seen = BTreeSet::new();
    for column in &dataset.columns {
        let col_name = column.name.trim().to_uppercase();
        if col_name.is_empty() || col_name.len() > 8 {
            return Err(XptError::InvalidVariableName(column.name.clone()));
        }
        if !seen.insert(col_name) {
            return Err(XptError::DuplicateVariable(column.name.clone()));
        }
        if column.length == 0 {
            return Err(XptError::ZeroLength(column.name.clone()));
        }
    }

    for row in &dataset.rows {
        if row.len() != dataset.columns.len() {
            return Err(XptError::RowLengthMismatch {
                expected: dataset.columns.len(),
                actual: row.len(),
            });
        }
    }

    Ok(())
}

/// Encode one cell into its fixed-width representation.
fn encode_value(value: &XptValue, column: &XptColumn) -> Vec<u8> {
    match (value, column.data_type) {
        (XptValue::Char(s), XptType::Char) => encode_char(s, column.length),
        (XptValue::Num(n), XptType::Num) => encode_num(*n),
        (XptValue::Char(s), XptType::Num) => encode_num(s.trim().parse::<f64>().ok()),
        (XptValue::Num(n), XptType::Char) => {
            let text = n.map(|v| v.to_string()).unwrap_or_default();
            encode_char(&text, column.length)
        }
    }
}

fn encode_char(value: &str, length: u16) -> Vec<u8> {
    let len = length as usize;
    let mut out = Vec::with_capacity(len);
    for ch in value.chars().take(len) {
        out.push(if ch.is_ascii() { ch as u8 } else { b'?' });
    }
    out.resize(len, b' ');
    out
}

fn encode_num(value: Option<f64>) -> Vec<u8> {
    match value {
        Some(v) if v.is_finite() => ieee_to_ibm(v).to_vec(),
        _ => encode_missing().to_vec(),
    }
}

/// Packs arbitrary-length payloads into 80-byte records, space-padding
/// the final partial record.
struct RecordWriter<'a, W: Write> {
    writer: &'a mut W,
    record: [u8; RECORD_LEN],
    pos: usize,
}

impl<'a, W: Write> RecordWriter<'a, W> {
    fn new(writer: &'a mut W) -> Self {
        Self {
            writer,
            record: [b' '; RECORD_LEN],
            pos: 0,
        }
    }

    fn write_bytes(&mut self, mut bytes: &[u8]) -> crate::Result<()> {
        while !bytes.is_empty() {
            let take = (RECORD_LEN - self.pos).min(bytes.len());
            self.record[self.pos..self.pos + take].copy_from_slice(&bytes[..take]);
            self.pos += take;
            bytes = &bytes[take..];

            if self.pos == RECORD_LEN {
                self.writer.write_all(&self.record)?;
                self.record = [b' '; RECORD_LEN];
                self.pos = 0;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> crate::Result<()> {
        if self.pos > 0 {
            for byte in self.record.iter_mut().skip(self.pos) {
                *byte = b' ';
            }
            self.writer.write_all(&self.record)?;
            self.pos = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_columns() {
        let mut ds = XptDataset::new("DM");
        ds.columns = vec![XptColumn::numeric("AGE"), XptColumn::numeric("age")];
        assert!(matches!(
            validate_dataset(&ds),
            Err(XptError::DuplicateVariable(_))
        ));
    }

    #[test]
    fn rejects_long_names() {
        let ds = XptDataset::new("DEMOGRAPHICS");
        assert!(matches!(
            validate_dataset(&ds),
            Err(XptError::InvalidDatasetName(_))
        ));
    }

    #[test]
    fn char_encoding_pads_and_truncates() {
        assert_eq!(encode_char("AB", 4), b"AB  ");
        assert_eq!(encode_char("ABCDEF", 4), b"ABCD");
        assert_eq!(encode_char("\u{00e9}", 2), b"? ");
    }

    #[test]
    fn missing_numeric_is_dot_zero() {
        let bytes = encode_num(None);
        assert_eq!(bytes[0], b'.');
        assert!(bytes[1..].iter().all(|&b| b == 0));
    }
}
