//! The reviewer-facing mapping workbook and its JSON mirror.

use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use astraea_model::DomainMappingSpec;

const HEADERS: [&str; 8] = [
    "Variable",
    "Label",
    "Type",
    "Length",
    "Origin",
    "Source",
    "Derivation Algorithm",
    "CT",
];

/// Write one domain's mapping spec as an Excel workbook.
pub fn write_mapping_workbook(path: &Path, spec: &DomainMappingSpec) -> Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(spec.domain.as_str())
        .context("set sheet name")?;

    for (col, header) in HEADERS.iter().enumerate() {
        worksheet
            .write_string_with_format(0, col as u16, *header, &bold)
            .context("write header")?;
    }

    for (row, mapping) in spec.ordered_mappings().iter().enumerate() {
        let row = (row + 1) as u32;
        let source = match (&mapping.source_dataset, &mapping.source_variable) {
            (Some(dataset), Some(variable)) => format!("{dataset}.{variable}"),
            (None, Some(variable)) => variable.clone(),
            _ => String::new(),
        };
        let ct = match (&mapping.codelist_code, &mapping.codelist_name) {
            (Some(code), Some(name)) => format!("{name} ({code})"),
            (Some(code), None) => code.clone(),
            _ => String::new(),
        };

        worksheet.write_string(row, 0, &mapping.sdtm_variable)?;
        worksheet.write_string(row, 1, mapping.label.as_deref().unwrap_or(""))?;
        worksheet.write_string(
            row,
            2,
            mapping.data_type.map(|t| t.to_string()).unwrap_or_default(),
        )?;
        worksheet.write_string(
            row,
            3,
            mapping
                .length
                .map(|l| l.to_string())
                .unwrap_or_default(),
        )?;
        worksheet.write_string(
            row,
            4,
            mapping.origin.map(|o| o.to_string()).unwrap_or_default(),
        )?;
        worksheet.write_string(row, 5, &source)?;
        worksheet.write_string(row, 6, mapping.derivation_rule.as_deref().unwrap_or(""))?;
        worksheet.write_string(row, 7, &ct)?;
    }

    workbook.save(path).context("save mapping workbook")?;
    Ok(())
}

/// Write the structured JSON mirror of a spec.
pub fn write_mapping_json(path: &Path, spec: &DomainMappingSpec) -> Result<()> {
    let json = serde_json::to_string_pretty(spec).context("serialize mapping spec")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
