//! The bundle manifest: version pins plus per-asset checksums.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StandardsError;

/// One asset recorded in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFile {
    /// Role the asset plays (e.g., "sdtmig_domains", "ct_codelists").
    pub role: String,

    /// Asset path, relative to the bundle root.
    pub path: String,

    /// Lowercase hex SHA-256 of the asset bytes.
    pub sha256: String,
}

/// The manifest locking IG and CT releases together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest schema identifier.
    pub schema: String,

    /// Manifest schema version.
    pub schema_version: u32,

    /// SDTM-IG release the domain bundle was built from.
    pub ig_version: String,

    /// CT release the codelist bundle was built from.
    pub ct_version: String,

    /// Recorded assets.
    pub files: Vec<BundleFile>,
}

/// Expected manifest schema identifier.
pub const MANIFEST_SCHEMA: &str = "astraea.standards-manifest";

impl Manifest {
    /// Parse a manifest and check its schema identifier.
    pub fn parse(json: &str) -> Result<Self, StandardsError> {
        let manifest: Manifest =
            serde_json::from_str(json).map_err(|source| StandardsError::Parse {
                path: "manifest.json".to_string(),
                source,
            })?;
        if manifest.schema != MANIFEST_SCHEMA || manifest.schema_version != 1 {
            return Err(StandardsError::UnsupportedSchema(format!(
                "{} v{}",
                manifest.schema, manifest.schema_version
            )));
        }
        Ok(manifest)
    }

    /// Find the recorded asset for a role.
    pub fn file_for_role(&self, role: &str) -> Result<&BundleFile, StandardsError> {
        self.files
            .iter()
            .find(|f| f.role == role)
            .ok_or_else(|| StandardsError::MissingRole(role.to_string()))
    }

    /// Verify an asset's bytes against the recorded checksum.
    pub fn verify_asset(&self, role: &str, bytes: &[u8]) -> Result<(), StandardsError> {
        let file = self.file_for_role(role)?;
        let actual = sha256_hex(bytes);
        let expected = file.sha256.to_ascii_lowercase();
        if actual != expected {
            return Err(StandardsError::ChecksumMismatch {
                path: file.path.clone(),
                expected,
                actual,
            });
        }
        Ok(())
    }
}

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
