//! XPT v5 reader.
//!
//! Parses the single-member files the writer emits. Used for read-back
//! verification after every write and for package-level validation.

use std::path::Path;

use crate::error::XptError;
use crate::float::{ibm_to_ieee, is_missing};
use crate::header::{
    DSCRPTR_HEADER_PREFIX, LIBRARY_HEADER_PREFIX, MEMBER_HEADER_PREFIX, NAMESTR_HEADER_PREFIX,
    NAMESTR_LEN, OBS_HEADER_PREFIX, RECORD_LEN, align_to_record, expect_header,
    parse_dataset_label, parse_dataset_name, parse_namestr, parse_variable_count,
};
use crate::types::{XptDataset, XptType, XptValue};

/// Read a single-member XPT file.
pub fn read_xpt(path: &Path) -> crate::Result<XptDataset> {
    let bytes = std::fs::read(path)?;
    parse_xpt(&bytes)
}

fn parse_xpt(bytes: &[u8]) -> crate::Result<XptDataset> {
    let mut cursor = Cursor { bytes, offset: 0 };

    expect_header(cursor.take_record()?, LIBRARY_HEADER_PREFIX, "LIBRARY")?;
    cursor.take_record()?; // real header
    cursor.take_record()?; // second header

    expect_header(cursor.take_record()?, MEMBER_HEADER_PREFIX, "MEMBER")?;
    expect_header(cursor.take_record()?, DSCRPTR_HEADER_PREFIX, "DSCRPTR")?;
    let member_data = cursor.take_record()?;
    let name = parse_dataset_name(member_data)?;
    let member_second = cursor.take_record()?;
    let label = parse_dataset_label(member_second);

    let namestr_header = cursor.take_record()?;
    expect_header(namestr_header, NAMESTR_HEADER_PREFIX, "NAMESTR")?;
    let var_count = parse_variable_count(namestr_header)?;

    let namestr_bytes = align_to_record(var_count * NAMESTR_LEN);
    let namestr_block = cursor.take(namestr_bytes)?;
    let mut columns = Vec::with_capacity(var_count);
    for idx in 0..var_count {
        let offset = idx * NAMESTR_LEN;
        columns.push(parse_namestr(&namestr_block[offset..offset + NAMESTR_LEN], idx)?);
    }

    expect_header(cursor.take_record()?, OBS_HEADER_PREFIX, "OBS")?;

    let obs_len: usize = columns.iter().map(|c| c.length as usize).sum();
    if obs_len == 0 {
        return Ok(XptDataset {
            name,
            label,
            columns,
            rows: Vec::new(),
        });
    }

    let data = cursor.rest();
    let mut rows = Vec::new();
    let mut offset = 0usize;
    while offset + obs_len <= data.len() {
        let record = &data[offset..offset + obs_len];
        // The final records are space padding, not observations.
        if record.iter().all(|&b| b == b' ') && data[offset + obs_len..].iter().all(|&b| b == b' ')
        {
            break;
        }
        let mut row = Vec::with_capacity(columns.len());
        let mut pos = 0usize;
        for column in &columns {
            let field = &record[pos..pos + column.length as usize];
            row.push(decode_value(field, column.data_type));
            pos += column.length as usize;
        }
        rows.push(row);
        offset += obs_len;
    }

    Ok(XptDataset {
        name,
        label,
        columns,
        rows,
    })
}

fn decode_value(field: &[u8], data_type: XptType) -> XptValue {
    match data_type {
        XptType::Char => {
            let text = String::from_utf8_lossy(field).trim_end().to_string();
            XptValue::Char(text)
        }
        XptType::Num => {
            if is_missing(field) {
                return XptValue::Num(None);
            }
            let mut bytes = [0u8; 8];
            let len = field.len().min(8);
            bytes[..len].copy_from_slice(&field[..len]);
            XptValue::Num(Some(ibm_to_ieee(bytes)))
        }
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn take_record(&mut self) -> crate::Result<&'a [u8]> {
        self.take(RECORD_LEN)
    }

    fn take(&mut self, len: usize) -> crate::Result<&'a [u8]> {
        let end = self.offset + len;
        let slice = self
            .bytes
            .get(self.offset..end)
            .ok_or_else(|| XptError::InvalidFormat("unexpected end of file".to_string()))?;
        self.offset = end;
        Ok(slice)
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.offset..]
    }
}
