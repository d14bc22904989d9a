//! The known-false-positive whitelist.

use std::path::Path;

use astraea_model::{ValidationReport, WhitelistEntry};

/// Load whitelist entries from a JSON file.
pub fn load_whitelist(path: &Path) -> std::io::Result<Vec<WhitelistEntry>> {
    let text = std::fs::read_to_string(path)?;
    serde_json::from_str(&text)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Flag whitelisted findings and recompute the report aggregates.
///
/// Flagged findings stay visible in the report; they simply stop counting
/// toward `effective_error_count` and `submission_ready`.
pub fn apply_whitelist(report: &mut ValidationReport, entries: &[WhitelistEntry]) {
    if entries.is_empty() {
        return;
    }
    for result in report.all_results_mut() {
        if let Some(entry) = entries.iter().find(|entry| entry.matches(result)) {
            result.known_false_positive = true;
            result.known_false_positive_reason = Some(entry.reason.clone());
        }
    }
    report.recompute();
}
