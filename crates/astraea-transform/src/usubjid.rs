//! USUBJID construction and consistency.

use std::collections::BTreeMap;

use polars::prelude::{AnyValue, DataFrame};

use crate::error::TransformError;

/// Build a USUBJID from its components.
///
/// Components are whitespace-stripped; an empty or missing component is
/// an error rather than a silently corrupt identifier.
pub fn generate_usubjid(
    studyid: &str,
    siteid: &str,
    subjid: &str,
    delimiter: &str,
) -> Result<String, TransformError> {
    let parts = [("STUDYID", studyid), ("SITEID", siteid), ("SUBJID", subjid)];
    let mut cleaned = Vec::with_capacity(3);
    for (name, value) in parts {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan") {
            return Err(TransformError::UsubjidComponentMissing(name.to_string()));
        }
        cleaned.push(trimmed);
    }
    Ok(cleaned.join(delimiter))
}

/// Check referential integrity of USUBJID across executed domains.
///
/// Every USUBJID in every non-DM domain must exist in DM, and DM itself
/// must contain no duplicates. Returns human-readable violations.
pub fn validate_usubjid_consistency(frames: &BTreeMap<String, DataFrame>) -> Vec<String> {
    let mut violations = Vec::new();

    let Some(dm) = frames.get("DM").or_else(|| frames.get("dm")) else {
        violations.push("DM domain is missing; USUBJID consistency cannot hold".to_string());
        return violations;
    };

    let dm_ids = column_strings(dm, "USUBJID");
    let mut seen = std::collections::BTreeSet::new();
    for id in dm_ids.iter().flatten() {
        if !seen.insert(id.clone()) {
            violations.push(format!("DM contains duplicate USUBJID {id}"));
        }
    }

    for (domain, frame) in frames {
        if domain.eq_ignore_ascii_case("DM") {
            continue;
        }
        for id in column_strings(frame, "USUBJID").iter().flatten() {
            if !seen.contains(id) {
                violations.push(format!("{domain} USUBJID {id} does not exist in DM"));
            }
        }
    }

    violations
}

fn column_strings(df: &DataFrame, column: &str) -> Vec<Option<String>> {
    let Ok(series) = df.column(column) else {
        return Vec::new();
    };
    (0..df.height())
        .map(|idx| match series.get(idx).unwrap_or(AnyValue::Null) {
            AnyValue::Null => None,
            AnyValue::String(s) if s.trim().is_empty() => None,
            AnyValue::String(s) => Some(s.to_string()),
            AnyValue::StringOwned(s) => {
                let owned = s.to_string();
                if owned.trim().is_empty() { None } else { Some(owned) }
            }
            other => Some(other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn joins_with_delimiter_and_strips() {
        assert_eq!(
            generate_usubjid("301", "04401", "01", "-").unwrap(),
            "301-04401-01"
        );
        assert_eq!(
            generate_usubjid(" 301 ", "04401", " 01", "/").unwrap(),
            "301/04401/01"
        );
    }

    #[test]
    fn empty_component_fails_fast() {
        assert!(generate_usubjid("301", "", "01", "-").is_err());
        assert!(generate_usubjid("301", "NaN", "01", "-").is_err());
    }

    #[test]
    fn orphan_and_duplicate_detection() {
        let mut frames = BTreeMap::new();
        frames.insert(
            "DM".to_string(),
            df! {"USUBJID" => ["S-1", "S-2", "S-2"]}.unwrap(),
        );
        frames.insert(
            "AE".to_string(),
            df! {"USUBJID" => ["S-1", "S-9"]}.unwrap(),
        );

        let violations = validate_usubjid_consistency(&frames);
        assert!(violations.iter().any(|v| v.contains("duplicate USUBJID S-2")));
        assert!(violations.iter().any(|v| v.contains("S-9")));
    }
}
