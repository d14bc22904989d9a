//! Bundle health checks surfaced through the CLI.
//!
//! The doctor re-runs the manifest and checksum verification the store
//! performs at load time, but reports the outcome per asset instead of
//! failing on the first mismatch, and adds content counts so an operator
//! can see at a glance what the bundles actually carry.

use serde::Serialize;

use crate::bundle::{CT_JSON, MANIFEST_JSON, SDTMIG_JSON, parse_ct_bundle, parse_domain_bundle};
use crate::error::StandardsError;
use crate::manifest::Manifest;

/// Machine-readable doctor report.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub schema: String,
    pub schema_version: u32,
    pub ig_version: String,
    pub ct_version: String,
    pub assets: Vec<AssetCheck>,
    pub counts: DoctorCounts,
}

/// Verification outcome for one recorded asset.
#[derive(Debug, Clone, Serialize)]
pub struct AssetCheck {
    pub role: String,
    pub path: String,
    pub sha256: String,
    pub verified: bool,
}

/// Content counts across the bundles.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorCounts {
    pub assets: usize,
    pub domains: usize,
    pub variables: usize,
    pub codelists: usize,
    pub ct_terms: usize,
}

impl DoctorReport {
    /// Whether every recorded asset verified against its checksum.
    pub fn all_verified(&self) -> bool {
        self.assets.iter().all(|a| a.verified)
    }
}

/// Verify the embedded bundles and assemble the report.
///
/// A malformed manifest or bundle is still a hard error; a checksum
/// mismatch is reported per asset rather than aborting, so the operator
/// sees the full picture in one run.
pub fn run_doctor() -> Result<DoctorReport, StandardsError> {
    let manifest = Manifest::parse(MANIFEST_JSON)?;

    let asset_bytes: &[(&str, &[u8])] = &[
        ("sdtmig_domains", SDTMIG_JSON.as_bytes()),
        ("ct_codelists", CT_JSON.as_bytes()),
    ];
    let mut assets = Vec::with_capacity(manifest.files.len());
    for file in &manifest.files {
        let verified = asset_bytes
            .iter()
            .find(|(role, _)| *role == file.role)
            .is_some_and(|(role, bytes)| manifest.verify_asset(role, bytes).is_ok());
        assets.push(AssetCheck {
            role: file.role.clone(),
            path: file.path.clone(),
            sha256: file.sha256.clone(),
            verified,
        });
    }

    let (_, domains) = parse_domain_bundle(SDTMIG_JSON)?;
    let ct = parse_ct_bundle(CT_JSON)?;

    let counts = DoctorCounts {
        assets: assets.len(),
        domains: domains.len(),
        variables: domains.iter().map(|d| d.variables.len()).sum(),
        codelists: ct.codelists.len(),
        ct_terms: ct.codelists.values().map(|c| c.terms.len()).sum(),
    };

    Ok(DoctorReport {
        schema: "astraea.standards-doctor".to_string(),
        schema_version: 1,
        ig_version: manifest.ig_version.clone(),
        ct_version: manifest.ct_version.clone(),
        assets,
        counts,
    })
}
