//! Raw dataset discovery.

use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};

/// A dataset file found in the study data directory.
#[derive(Debug, Clone)]
pub struct DiscoveredDataset {
    /// Path to the data file.
    pub path: PathBuf,

    /// Dataset name: filename stem, lowercased.
    pub name: String,
}

/// List dataset files in a directory, sorted by name.
///
/// Accepts the CSV interchange extension; metadata sidecars are skipped
/// (they travel with their data file).
pub fn discover_datasets(dir: &Path) -> Result<Vec<DiscoveredDataset>> {
    if !dir.is_dir() {
        return Err(IngestError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|source| IngestError::DirectoryRead {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut datasets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| IngestError::DirectoryRead {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_csv = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
        if !is_csv {
            continue;
        }
        // `<stem>.meta.json` sidecars never reach here (extension json),
        // but guard against double extensions like `dm.meta.csv`.
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem.to_lowercase().ends_with(".meta") {
            continue;
        }

        datasets.push(DiscoveredDataset {
            name: stem.to_lowercase(),
            path,
        });
    }

    datasets.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(datasets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_sorted_csv_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["dm.csv", "ae.csv", "lb_biochem.csv", "notes.txt"] {
            std::fs::write(dir.path().join(name), "A\n1\n").unwrap();
        }

        let found = discover_datasets(dir.path()).unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ae", "dm", "lb_biochem"]);
    }

    #[test]
    fn missing_directory_is_an_error() {
        assert!(discover_datasets(Path::new("/nonexistent/astraea")).is_err());
    }
}
