//! The 80-byte header records of the transport format.

use crate::error::XptError;
use crate::types::{XptColumn, XptDataset, XptType, XptWriterOptions};

/// Record length in bytes.
pub const RECORD_LEN: usize = 80;

/// NAMESTR record length.
pub const NAMESTR_LEN: usize = 140;

pub const LIBRARY_HEADER_PREFIX: &str = "HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
pub const MEMBER_HEADER_PREFIX: &str = "HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
pub const DSCRPTR_HEADER_PREFIX: &str = "HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
pub const NAMESTR_HEADER_PREFIX: &str = "HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
pub const OBS_HEADER_PREFIX: &str = "HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// A fixed header record: 48-byte prefix, then '0' fill, two spaces.
fn fixed_header(prefix: &str) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    let bytes = prefix.as_bytes();
    let len = bytes.len().min(48);
    record[..len].copy_from_slice(&bytes[..len]);
    for byte in record.iter_mut().take(78).skip(48) {
        *byte = b'0';
    }
    record
}

pub fn build_library_header() -> [u8; RECORD_LEN] {
    fixed_header(LIBRARY_HEADER_PREFIX)
}

/// The "real" header: SAS symbols, version, OS, created timestamp.
pub fn build_real_header(options: &XptWriterOptions) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_str(&mut record, 0, "SAS", 8);
    write_str(&mut record, 8, "SAS", 8);
    write_str(&mut record, 16, "SASLIB", 8);
    write_str(&mut record, 24, &options.sas_version, 8);
    write_str(&mut record, 32, &options.os_name, 8);
    write_str(&mut record, 64, &options.format_timestamp(), 16);
    record
}

/// The second library header: modified timestamp only.
pub fn build_second_header(options: &XptWriterOptions) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_str(&mut record, 0, &options.format_timestamp(), 16);
    record
}

/// Member header carrying the NAMESTR record length.
pub fn build_member_header() -> [u8; RECORD_LEN] {
    let mut record = fixed_header(MEMBER_HEADER_PREFIX);
    write_str(&mut record, 64, "0160", 4);
    let len = format!("{NAMESTR_LEN:04}");
    write_str(&mut record, 74, &len, 4);
    record
}

pub fn build_dscrptr_header() -> [u8; RECORD_LEN] {
    fixed_header(DSCRPTR_HEADER_PREFIX)
}

/// Member data record: dataset name, version, OS, created timestamp.
pub fn build_member_data(dataset: &XptDataset, options: &XptWriterOptions) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_str(&mut record, 0, "SAS", 8);
    write_str(&mut record, 8, &dataset.name, 8);
    write_str(&mut record, 16, "SASDATA", 8);
    write_str(&mut record, 24, &options.sas_version, 8);
    write_str(&mut record, 32, &options.os_name, 8);
    write_str(&mut record, 64, &options.format_timestamp(), 16);
    record
}

/// Member second record: modified timestamp and the dataset label.
pub fn build_member_second(dataset: &XptDataset, options: &XptWriterOptions) -> [u8; RECORD_LEN] {
    let mut record = [b' '; RECORD_LEN];
    write_str(&mut record, 0, &options.format_timestamp(), 16);
    write_str(&mut record, 32, dataset.label.as_deref().unwrap_or(""), 40);
    record
}

/// NAMESTR header carrying the variable count.
pub fn build_namestr_header(var_count: usize) -> [u8; RECORD_LEN] {
    let mut record = fixed_header(NAMESTR_HEADER_PREFIX);
    let count = format!("{var_count:04}");
    write_str(&mut record, 54, &count, 4);
    record
}

pub fn build_obs_header() -> [u8; RECORD_LEN] {
    fixed_header(OBS_HEADER_PREFIX)
}

/// Build the 140-byte NAMESTR record for one variable.
pub fn build_namestr(column: &XptColumn, varnum: u16, position: u32) -> [u8; NAMESTR_LEN] {
    let mut buf = [0u8; NAMESTR_LEN];
    write_i16(&mut buf, 0, column.data_type.to_ntype());
    write_i16(&mut buf, 4, column.length as i16);
    write_i16(&mut buf, 6, varnum as i16);
    write_padded(&mut buf, 8, &column.name, 8);
    write_padded(&mut buf, 16, column.label.as_deref().unwrap_or(""), 40);
    // Format/informat fields stay blank; submission datasets carry their
    // presentation metadata in define.xml instead.
    write_i32(&mut buf, 84, position as i32);
    buf
}

/// Parse a NAMESTR record back into a column.
pub fn parse_namestr(data: &[u8], index: usize) -> Result<XptColumn, XptError> {
    if data.len() < NAMESTR_LEN {
        return Err(XptError::InvalidNamestr {
            index,
            message: format!("record too short: {} bytes", data.len()),
        });
    }

    let ntype = read_i16(data, 0);
    let data_type = XptType::from_ntype(ntype).ok_or_else(|| XptError::InvalidNamestr {
        index,
        message: format!("invalid ntype {ntype}"),
    })?;

    let length = read_i16(data, 4) as u16;
    if length == 0 {
        return Err(XptError::InvalidNamestr {
            index,
            message: "variable length is zero".to_string(),
        });
    }

    let name = read_str(data, 8, 8);
    if name.is_empty() {
        return Err(XptError::InvalidNamestr {
            index,
            message: "empty variable name".to_string(),
        });
    }
    let label = read_str(data, 16, 40);

    Ok(XptColumn {
        name,
        label: (!label.is_empty()).then_some(label),
        data_type,
        length,
    })
}

/// Check that a record starts with the given header prefix.
pub fn expect_header(
    record: &[u8],
    prefix: &str,
    what: &'static str,
) -> Result<(), XptError> {
    if record.len() < RECORD_LEN {
        return Err(XptError::InvalidFormat(format!("{what} record too short")));
    }
    if !record.starts_with(prefix.as_bytes()) {
        return Err(XptError::MissingHeader(what));
    }
    Ok(())
}

/// Parse the 4-digit variable count out of a NAMESTR header.
pub fn parse_variable_count(record: &[u8]) -> Result<usize, XptError> {
    let text = read_str(record, 54, 4);
    text.trim()
        .parse::<usize>()
        .map_err(|_| XptError::InvalidFormat("unparseable variable count".to_string()))
}

/// Dataset name out of the member data record.
pub fn parse_dataset_name(record: &[u8]) -> Result<String, XptError> {
    let name = read_str(record, 8, 8);
    if name.is_empty() {
        return Err(XptError::InvalidFormat("empty dataset name".to_string()));
    }
    Ok(name)
}

/// Dataset label out of the member second record.
pub fn parse_dataset_label(record: &[u8]) -> Option<String> {
    let label = read_str(record, 32, 40);
    (!label.is_empty()).then_some(label)
}

/// Round a byte count up to the next 80-byte record boundary.
pub fn align_to_record(size: usize) -> usize {
    size.div_ceil(RECORD_LEN) * RECORD_LEN
}

fn write_str(buf: &mut [u8], offset: usize, value: &str, len: usize) {
    let bytes = value.as_bytes();
    let copy = bytes.len().min(len);
    buf[offset..offset + copy].copy_from_slice(&bytes[..copy]);
}

fn write_padded(buf: &mut [u8], offset: usize, value: &str, len: usize) {
    for slot in buf[offset..offset + len].iter_mut() {
        *slot = b' ';
    }
    write_str(buf, offset, value, len);
}

fn write_i16(buf: &mut [u8], offset: usize, value: i16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
}

fn write_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn read_i16(data: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([data[offset], data[offset + 1]])
}

fn read_str(data: &[u8], offset: usize, len: usize) -> String {
    data.get(offset..offset + len)
        .map(|slice| String::from_utf8_lossy(slice).trim_end().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namestr_round_trips() {
        let column = XptColumn::character("USUBJID", 20).with_label("Unique Subject Identifier");
        let record = build_namestr(&column, 3, 40);
        let parsed = parse_namestr(&record, 0).unwrap();
        assert_eq!(parsed.name, "USUBJID");
        assert_eq!(parsed.label.as_deref(), Some("Unique Subject Identifier"));
        assert_eq!(parsed.data_type, XptType::Char);
        assert_eq!(parsed.length, 20);
    }

    #[test]
    fn headers_carry_counts() {
        let header = build_namestr_header(26);
        assert_eq!(parse_variable_count(&header).unwrap(), 26);
    }

    #[test]
    fn alignment() {
        assert_eq!(align_to_record(0), 0);
        assert_eq!(align_to_record(80), 80);
        assert_eq!(align_to_record(81), 160);
        assert_eq!(align_to_record(140), 160);
        assert_eq!(align_to_record(280), 320);
    }
}
