//! SUPPQUAL generation.
//!
//! Non-standard source variables worth keeping become rows of a
//! supplemental qualifier dataset. Rows are generated from the parent
//! frame itself, so the `(RDOMAIN, USUBJID, IDVAR, IDVARVAL)` foreign key
//! resolves by construction; `validate_suppqual_links` re-checks it for
//! frames loaded from disk.

use polars::prelude::{Column, DataFrame};
use tracing::warn;

use crate::error::TransformError;
use crate::frame::DomainFrame;
use crate::handlers::string_values;

/// One source column to carry into SUPPQUAL.
#[derive(Debug, Clone)]
pub struct SuppqualCandidate {
    /// Column in the parent frame holding the values.
    pub source_column: String,

    /// QNAM: ≤8 chars, uppercase alphanumeric.
    pub qnam: String,

    /// QLABEL: ≤40 chars.
    pub qlabel: String,

    /// QORIG: origin of the value (e.g., "CRF").
    pub qorig: String,
}

/// Build the SUPP-- dataset for a parent domain frame.
///
/// `idvar` names the parent identifier variable (usually --SEQ); DM has
/// none, in which case IDVAR/IDVARVAL stay empty and USUBJID alone links
/// the row. Rows with a missing qualifier value are skipped.
pub fn build_suppqual(
    parent: &DomainFrame,
    study_id: &str,
    idvar: Option<&str>,
    candidates: &[SuppqualCandidate],
) -> Result<Option<DomainFrame>, TransformError> {
    if candidates.is_empty() {
        return Ok(None);
    }

    let rdomain = parent.domain.to_uppercase();
    let usubjids = string_values(&parent.data, "USUBJID");
    let idvar_values = idvar
        .map(|column| string_values(&parent.data, column))
        .unwrap_or_else(|| vec![None; parent.data.height()]);

    let mut studyid_out = Vec::new();
    let mut rdomain_out = Vec::new();
    let mut usubjid_out = Vec::new();
    let mut idvar_out = Vec::new();
    let mut idvarval_out = Vec::new();
    let mut qnam_out = Vec::new();
    let mut qlabel_out = Vec::new();
    let mut qval_out = Vec::new();
    let mut qorig_out = Vec::new();
    let mut qeval_out: Vec<Option<String>> = Vec::new();

    for candidate in candidates {
        let qnam = candidate.qnam.to_uppercase();
        if qnam.len() > 8 || !qnam.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            warn!(qnam = %candidate.qnam, "skipping SUPPQUAL candidate with invalid QNAM");
            continue;
        }

        let values = string_values(&parent.data, &candidate.source_column);
        for idx in 0..parent.data.height() {
            let Some(value) = values.get(idx).cloned().flatten() else {
                continue;
            };
            let Some(usubjid) = usubjids.get(idx).cloned().flatten() else {
                continue;
            };

            studyid_out.push(Some(study_id.to_string()));
            rdomain_out.push(Some(rdomain.clone()));
            usubjid_out.push(Some(usubjid));
            idvar_out.push(idvar.map(|v| v.to_uppercase()));
            idvarval_out.push(idvar_values.get(idx).cloned().flatten());
            qnam_out.push(Some(qnam.clone()));
            qlabel_out.push(Some(truncate(&candidate.qlabel, 40)));
            qval_out.push(Some(truncate(&value, 200)));
            qorig_out.push(Some(candidate.qorig.clone()));
            qeval_out.push(None);
        }
    }

    if qnam_out.is_empty() {
        return Ok(None);
    }

    let data = DataFrame::new(vec![
        Column::new("STUDYID".into(), studyid_out),
        Column::new("RDOMAIN".into(), rdomain_out),
        Column::new("USUBJID".into(), usubjid_out),
        Column::new("IDVAR".into(), idvar_out),
        Column::new("IDVARVAL".into(), idvarval_out),
        Column::new("QNAM".into(), qnam_out),
        Column::new("QLABEL".into(), qlabel_out),
        Column::new("QVAL".into(), qval_out),
        Column::new("QORIG".into(), qorig_out),
        Column::new("QEVAL".into(), qeval_out),
    ])?;

    Ok(Some(DomainFrame::new(format!("SUPP{rdomain}"), data)))
}

/// Verify that every SUPPQUAL row resolves into its parent frame.
pub fn validate_suppqual_links(supp: &DataFrame, parent: &DataFrame) -> Vec<String> {
    let mut violations = Vec::new();

    let usubjids = string_values(supp, "USUBJID");
    let idvars = string_values(supp, "IDVAR");
    let idvarvals = string_values(supp, "IDVARVAL");
    let parent_usubjids = string_values(parent, "USUBJID");

    for idx in 0..supp.height() {
        let usubjid = usubjids.get(idx).cloned().flatten().unwrap_or_default();
        let idvar = idvars.get(idx).cloned().flatten();
        let idvarval = idvarvals.get(idx).cloned().flatten();

        let resolved = match (&idvar, &idvarval) {
            (Some(idvar), Some(idvarval)) => {
                let key_values = string_values(parent, idvar);
                parent_usubjids
                    .iter()
                    .zip(key_values.iter())
                    .any(|(parent_subject, parent_key)| {
                        parent_subject.as_deref() == Some(usubjid.as_str())
                            && parent_key.as_deref() == Some(idvarval.as_str())
                    })
            }
            _ => parent_usubjids
                .iter()
                .any(|parent_subject| parent_subject.as_deref() == Some(usubjid.as_str())),
        };

        if !resolved {
            violations.push(format!(
                "SUPPQUAL row {idx} ({usubjid}, {idvar:?}={idvarval:?}) has no parent record"
            ));
        }
    }

    violations
}

fn truncate(value: &str, max: usize) -> String {
    if value.len() <= max {
        value.to_string()
    } else {
        value.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    fn parent() -> DomainFrame {
        let data = df! {
            "USUBJID" => ["S-1", "S-2"],
            "LBSEQ" => ["1", "1"],
            "LBMETHOD" => [Some("DIPSTICK"), None],
        }
        .unwrap();
        DomainFrame::new("LB", data)
    }

    #[test]
    fn builds_rows_only_for_populated_values() {
        let supp = build_suppqual(
            &parent(),
            "301",
            Some("LBSEQ"),
            &[SuppqualCandidate {
                source_column: "LBMETHOD".to_string(),
                qnam: "LBMETHOD".to_string(),
                qlabel: "Method of Test".to_string(),
                qorig: "CRF".to_string(),
            }],
        )
        .unwrap()
        .unwrap();

        assert_eq!(supp.domain, "SUPPLB");
        assert_eq!(supp.record_count(), 1);
        let violations = validate_suppqual_links(&supp.data, &parent().data);
        assert!(violations.is_empty());
    }

    #[test]
    fn invalid_qnam_is_skipped() {
        let supp = build_suppqual(
            &parent(),
            "301",
            Some("LBSEQ"),
            &[SuppqualCandidate {
                source_column: "LBMETHOD".to_string(),
                qnam: "WAY-TOO-LONG-NAME".to_string(),
                qlabel: "Method".to_string(),
                qorig: "CRF".to_string(),
            }],
        )
        .unwrap();
        assert!(supp.is_none());
    }

    #[test]
    fn orphan_links_are_reported() {
        let supp_data = df! {
            "USUBJID" => ["S-9"],
            "IDVAR" => ["LBSEQ"],
            "IDVARVAL" => ["1"],
        }
        .unwrap();
        let violations = validate_suppqual_links(&supp_data, &parent().data);
        assert_eq!(violations.len(), 1);
    }
}
