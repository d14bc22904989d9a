//! Submission package checks and the package manifest.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use astraea_model::{RuleCategory, RuleResult, Severity};

/// Total transport size over which the package is rejected.
const MAX_PACKAGE_BYTES: u64 = 5 * 1024 * 1024 * 1024;

/// Per-file size over which a split is recommended.
const SPLIT_FILE_BYTES: u64 = 1024 * 1024 * 1024;

/// One recorded package file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageFile {
    /// Filename within the output directory.
    pub name: String,

    /// Size in bytes.
    pub size: u64,
}

/// The package manifest written next to the artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    /// Transport files with sizes.
    pub files: Vec<PackageFile>,

    /// Total transport bytes.
    pub total_bytes: u64,

    /// Whether define.xml is present.
    pub has_define_xml: bool,

    /// Whether the cSDRG is present.
    pub has_csdrg: bool,

    /// Whether a validation report is present.
    pub has_validation_report: bool,
}

/// Run the package-level checks and write `package_manifest.json`.
pub fn check_package(output_dir: &Path) -> Result<(PackageManifest, Vec<RuleResult>)> {
    let mut files = Vec::new();
    let mut findings = Vec::new();
    let mut total = 0u64;

    for entry in std::fs::read_dir(output_dir).context("read output directory")? {
        let entry = entry.context("read output entry")?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !name.to_lowercase().ends_with(".xpt") {
            continue;
        }
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        total += size;

        if name != name.to_lowercase() {
            findings.push(package_finding(
                "ASTR-PKG-NAME",
                Severity::Error,
                format!("transport file {name} must be lowercase"),
                None,
            ));
        }
        if size > SPLIT_FILE_BYTES {
            let domain = name.trim_end_matches(".xpt").to_uppercase();
            let guidance = split_guidance(&domain);
            findings.push(package_finding(
                "ASTR-PKG-SPLIT",
                Severity::Warning,
                format!("{name} is {} MB; consider splitting", size / (1024 * 1024)),
                Some(guidance),
            ));
        }

        files.push(PackageFile { name, size });
    }
    files.sort_by(|a, b| a.name.cmp(&b.name));

    if total > MAX_PACKAGE_BYTES {
        findings.push(package_finding(
            "ASTR-PKG-SIZE",
            Severity::Error,
            format!(
                "package transport size {} GB exceeds the 5 GB gateway limit",
                total / (1024 * 1024 * 1024)
            ),
            None,
        ));
    }

    let has_define_xml = output_dir.join("define.xml").is_file();
    if !has_define_xml {
        findings.push(package_finding(
            "ASTR-PKG-DEFINE",
            Severity::Error,
            "define.xml is missing from the package".to_string(),
            None,
        ));
    }

    let manifest = PackageManifest {
        files,
        total_bytes: total,
        has_define_xml,
        has_csdrg: output_dir.join("csdrg.md").is_file(),
        has_validation_report: output_dir.join("validation_report.json").is_file(),
    };

    let json = serde_json::to_string_pretty(&manifest).context("serialize package manifest")?;
    std::fs::write(output_dir.join("package_manifest.json"), json)
        .context("write package_manifest.json")?;

    Ok((manifest, findings))
}

/// Domain-specific advice for oversized files.
fn split_guidance(domain: &str) -> String {
    match domain {
        "LB" => "split LB by LBCAT (e.g. lb1.xpt chemistry, lb2.xpt hematology)".to_string(),
        "EG" => "split EG by EGCAT".to_string(),
        "QS" => "split QS by questionnaire (QSCAT)".to_string(),
        other => format!("split {other} by its category variable"),
    }
}

fn package_finding(
    rule_id: &str,
    severity: Severity,
    message: String,
    fix_suggestion: Option<String>,
) -> RuleResult {
    RuleResult {
        rule_id: rule_id.to_string(),
        rule_description: "Submission package constraint".to_string(),
        category: RuleCategory::FdaTrc,
        severity,
        domain: None,
        variable: None,
        message,
        affected_count: 1,
        fix_suggestion,
        p21_equivalent: None,
        known_false_positive: false,
        known_false_positive_reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_lists_transport_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("dm.xpt"), b"x".repeat(160)).unwrap();
        std::fs::write(dir.path().join("define.xml"), b"<ODM/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip me").unwrap();

        let (manifest, findings) = check_package(dir.path()).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].name, "dm.xpt");
        assert!(manifest.has_define_xml);
        assert!(findings.is_empty());
        assert!(dir.path().join("package_manifest.json").is_file());
    }

    #[test]
    fn missing_define_and_bad_casing_are_flagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("DM.xpt"), b"x").unwrap();

        let (_, findings) = check_package(dir.path()).unwrap();
        assert!(findings.iter().any(|f| f.rule_id == "ASTR-PKG-NAME"));
        assert!(findings.iter().any(|f| f.rule_id == "ASTR-PKG-DEFINE"));
    }
}
