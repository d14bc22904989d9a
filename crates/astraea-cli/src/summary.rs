//! Human-facing summary tables.

use comfy_table::{Cell, Table, presets::UTF8_FULL_CONDENSED};

use astraea_model::{DatasetProfile, DomainClassification, Severity, ValidationReport};

/// Render profiling results as a table.
pub fn profile_table(profiles: &[DatasetProfile]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Dataset", "Rows", "Columns", "EDC cols", "Date cols"]);
    for profile in profiles {
        table.add_row(vec![
            Cell::new(&profile.dataset_name),
            Cell::new(profile.row_count),
            Cell::new(profile.col_count),
            Cell::new(profile.edc_columns.len()),
            Cell::new(profile.date_variables.len()),
        ]);
    }
    table
}

/// Render classification results as a table.
pub fn classification_table(classifications: &[DomainClassification]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Dataset", "Domain", "Confidence", "Merge group"]);
    for classification in classifications {
        table.add_row(vec![
            Cell::new(&classification.dataset_name),
            Cell::new(&classification.primary_domain),
            Cell::new(format!("{:.2}", classification.confidence)),
            Cell::new(classification.merge_candidates.join(", ")),
        ]);
    }
    table
}

/// Render the validation summary as a table.
pub fn validation_table(report: &ValidationReport) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Domain", "Errors", "Warnings", "Notices", "Whitelisted"]);

    for (domain, validation) in &report.domains {
        let mut counts = [0usize; 4];
        for result in &validation.results {
            if result.known_false_positive {
                counts[3] += 1;
                continue;
            }
            match result.severity {
                Severity::Error => counts[0] += 1,
                Severity::Warning => counts[1] += 1,
                Severity::Notice => counts[2] += 1,
            }
        }
        table.add_row(vec![
            Cell::new(domain),
            Cell::new(counts[0]),
            Cell::new(counts[1]),
            Cell::new(counts[2]),
            Cell::new(counts[3]),
        ]);
    }
    table
}
