//! Parsed-eCRF cache.
//!
//! PDF extraction is an external collaborator; its output is a JSON cache
//! of forms and fields that this module reads and writes.

use std::path::Path;

use astraea_model::EcrfForm;

use crate::error::{IngestError, Result};

/// Load the parsed-eCRF cache.
pub fn load_ecrf_cache(path: &Path) -> Result<Vec<EcrfForm>> {
    let text = std::fs::read_to_string(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| IngestError::EcrfParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Write the parsed-eCRF cache, pretty-printed.
pub fn save_ecrf_cache(path: &Path, forms: &[EcrfForm]) -> Result<()> {
    let text = serde_json::to_string_pretty(forms).map_err(|source| IngestError::EcrfParse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, text).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::EcrfField;

    #[test]
    fn round_trips_forms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecrf.json");

        let forms = vec![EcrfForm {
            form_name: "Demographics".to_string(),
            page_numbers: vec![4, 5],
            fields: vec![EcrfField {
                field_number: 1,
                field_name: "BRTHDAT".to_string(),
                data_type: "date".to_string(),
                sas_label: "Date of Birth".to_string(),
                units: None,
                coded_values: None,
                field_oid: None,
            }],
        }];

        save_ecrf_cache(&path, &forms).unwrap();
        let loaded = load_ecrf_cache(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].fields[0].field_name, "BRTHDAT");
        assert_eq!(loaded[0].field("brthdat").unwrap().sas_label, "Date of Birth");
    }
}
