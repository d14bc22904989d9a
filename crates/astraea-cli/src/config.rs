//! Study configuration.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use astraea_transform::{EpochWindow, parse_iso_date};

/// Study-level configuration loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    /// Study identifier (STUDYID).
    pub study_id: String,

    /// Delimiter used when constructing USUBJIDs.
    #[serde(default = "default_delimiter")]
    pub usubjid_delimiter: String,

    /// Study-specific column aliases: mapping token to raw column name.
    #[serde(default)]
    pub column_aliases: BTreeMap<String, String>,

    /// Known-false-positive whitelist file.
    #[serde(default)]
    pub whitelist: Option<String>,

    /// Trial summary parameters, TSPARMCD to value. SSTDTC is required
    /// for a submittable package.
    #[serde(default)]
    pub trial_summary: BTreeMap<String, String>,

    /// Trial-design element windows (from the study's TA/SE design) used
    /// to derive EPOCH. Checked in declaration order.
    #[serde(default)]
    pub epoch_windows: Vec<EpochWindowConfig>,
}

/// One configured trial-design element window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochWindowConfig {
    /// EPOCH value (e.g. "SCREENING").
    pub epoch: String,

    /// First day of the element, ISO 8601.
    pub start: String,

    /// Last day of the element, ISO 8601; omit for an open end.
    #[serde(default)]
    pub end: Option<String>,
}

fn default_delimiter() -> String {
    "-".to_string()
}

impl Default for StudyConfig {
    fn default() -> Self {
        Self {
            study_id: "STUDY".to_string(),
            usubjid_delimiter: default_delimiter(),
            column_aliases: BTreeMap::new(),
            whitelist: None,
            trial_summary: BTreeMap::new(),
            epoch_windows: Vec::new(),
        }
    }
}

impl StudyConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    /// Load from the given path, or fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Parse the configured element windows. Unparseable dates are a
    /// configuration error, not something to guess around.
    pub fn parsed_epoch_windows(&self) -> Result<Vec<EpochWindow>> {
        self.epoch_windows
            .iter()
            .map(|window| {
                let start = parse_iso_date(&window.start).with_context(|| {
                    format!("epoch window {} has invalid start {:?}", window.epoch, window.start)
                })?;
                let end = match &window.end {
                    Some(end) => Some(parse_iso_date(end).with_context(|| {
                        format!("epoch window {} has invalid end {end:?}", window.epoch)
                    })?),
                    None => None,
                };
                Ok(EpochWindow {
                    epoch: window.epoch.clone(),
                    start,
                    end,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let text = r#"
            study_id = "301"
            usubjid_delimiter = "-"

            [column_aliases]
            SSUBJID = "Subject"

            [trial_summary]
            SSTDTC = "2022-03-01"
            TITLE = "A Study of Things"
        "#;
        let config: StudyConfig = toml::from_str(text).unwrap();
        assert_eq!(config.study_id, "301");
        assert_eq!(config.trial_summary.get("SSTDTC").unwrap(), "2022-03-01");
        assert_eq!(config.column_aliases.get("SSUBJID").unwrap(), "Subject");
    }

    #[test]
    fn defaults_apply() {
        let config: StudyConfig = toml::from_str("study_id = \"X\"").unwrap();
        assert_eq!(config.usubjid_delimiter, "-");
        assert!(config.trial_summary.is_empty());
        assert!(config.epoch_windows.is_empty());
    }

    #[test]
    fn epoch_windows_parse_in_order() {
        let text = r#"
            study_id = "301"

            [[epoch_windows]]
            epoch = "SCREENING"
            start = "2022-03-01"
            end = "2022-03-29"

            [[epoch_windows]]
            epoch = "TREATMENT"
            start = "2022-03-30"
        "#;
        let config: StudyConfig = toml::from_str(text).unwrap();
        let windows = config.parsed_epoch_windows().unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].epoch, "SCREENING");
        assert!(windows[1].end.is_none());

        let mut bad = config;
        bad.epoch_windows[0].start = "March 1st".to_string();
        assert!(bad.parsed_epoch_windows().is_err());
    }
}
