//! The reference store: immutable lookup of domain specs and codelists.

use std::collections::BTreeMap;

use tracing::info;

use astraea_model::{Codelist, CtCatalog, DomainSpec, VariableSpec};

use crate::bundle::{CT_JSON, MANIFEST_JSON, SDTMIG_JSON, parse_ct_bundle, parse_domain_bundle};
use crate::error::StandardsError;
use crate::manifest::Manifest;
use crate::{SUPPORTED_CT_VERSION, SUPPORTED_IG_VERSION};

/// Immutable reference store loaded once per process.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    manifest: Manifest,
    domains: BTreeMap<String, DomainSpec>,
    ct: CtCatalog,
    codelist_by_variable: BTreeMap<String, String>,
}

impl ReferenceStore {
    /// Load and verify the embedded bundles.
    ///
    /// Fails fast on any manifest, version-pin, or checksum mismatch.
    pub fn load() -> Result<Self, StandardsError> {
        let manifest = Manifest::parse(MANIFEST_JSON)?;
        manifest.verify_asset("sdtmig_domains", SDTMIG_JSON.as_bytes())?;
        manifest.verify_asset("ct_codelists", CT_JSON.as_bytes())?;

        if manifest.ig_version != SUPPORTED_IG_VERSION {
            return Err(StandardsError::IgVersionMismatch {
                found: manifest.ig_version.clone(),
                supported: SUPPORTED_IG_VERSION.to_string(),
            });
        }
        if manifest.ct_version != SUPPORTED_CT_VERSION {
            return Err(StandardsError::CtVersionMismatch {
                found: manifest.ct_version.clone(),
                supported: SUPPORTED_CT_VERSION.to_string(),
            });
        }

        let (ig_version, domain_list) = parse_domain_bundle(SDTMIG_JSON)?;
        if ig_version != manifest.ig_version {
            return Err(StandardsError::IgVersionMismatch {
                found: ig_version,
                supported: manifest.ig_version.clone(),
            });
        }

        let ct = parse_ct_bundle(CT_JSON)?;
        if ct.version != manifest.ct_version {
            return Err(StandardsError::CtVersionMismatch {
                found: ct.version.clone(),
                supported: manifest.ct_version.clone(),
            });
        }

        let mut domains = BTreeMap::new();
        for spec in domain_list {
            domains.insert(spec.domain.to_uppercase(), spec);
        }
        let codelist_by_variable = ct.variable_index();

        info!(
            ig_version = %manifest.ig_version,
            ct_version = %manifest.ct_version,
            domains = domains.len(),
            codelists = ct.codelists.len(),
            "reference store loaded"
        );

        Ok(Self {
            manifest,
            domains,
            ct,
            codelist_by_variable,
        })
    }

    /// The verified manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Domain spec by code.
    pub fn get_domain_spec(&self, domain: &str) -> Result<&DomainSpec, StandardsError> {
        self.domains
            .get(&domain.trim().to_uppercase())
            .ok_or_else(|| StandardsError::UnknownDomain(domain.to_string()))
    }

    /// All bundled domain codes, sorted.
    pub fn list_domains(&self) -> Vec<&str> {
        self.domains.values().map(|d| d.domain.as_str()).collect()
    }

    /// Required variable names for a domain.
    pub fn get_required_variables(&self, domain: &str) -> Result<Vec<&str>, StandardsError> {
        Ok(self.get_domain_spec(domain)?.required_variables())
    }

    /// Variable spec for a domain variable, when it exists.
    pub fn get_variable_spec(&self, domain: &str, var: &str) -> Option<&VariableSpec> {
        self.domains
            .get(&domain.trim().to_uppercase())
            .and_then(|d| d.variable(var))
    }

    /// Codelist by NCI code.
    pub fn lookup_codelist(&self, code: &str) -> Option<&Codelist> {
        self.ct.get(code)
    }

    /// Whether a value is acceptable for a codelist.
    ///
    /// Extensible codelists accept every value; non-extensible codelists
    /// require an exact submission-value match. Unknown codelist codes
    /// accept nothing.
    pub fn validate_term(&self, code: &str, value: &str) -> bool {
        self.ct.get(code).is_some_and(|cl| cl.accepts(value))
    }

    /// Whether a codelist is extensible. Unknown codes return false.
    pub fn is_extensible(&self, code: &str) -> bool {
        self.ct.get(code).is_some_and(|cl| cl.extensible)
    }

    /// Reverse index: the codelist governing an SDTM variable name.
    pub fn get_codelist_for_variable(&self, var_name: &str) -> Option<&Codelist> {
        self.codelist_by_variable
            .get(&var_name.trim().to_uppercase())
            .and_then(|code| self.ct.get(code))
    }
}
