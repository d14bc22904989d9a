//! Embedded reference bundles and their JSON formats.

use serde::Deserialize;

use astraea_model::{Codelist, CtCatalog, DomainSpec, Term};

use crate::error::StandardsError;

/// Embedded manifest JSON.
pub const MANIFEST_JSON: &str = include_str!("../assets/manifest.json");

/// Embedded SDTM-IG domain bundle.
pub const SDTMIG_JSON: &str = include_str!("../assets/sdtmig.json");

/// Embedded CT codelist bundle.
pub const CT_JSON: &str = include_str!("../assets/ct.json");

#[derive(Debug, Deserialize)]
struct DomainBundle {
    ig_version: String,
    domains: Vec<DomainSpec>,
}

#[derive(Debug, Deserialize)]
struct CtBundleCodelist {
    code: String,
    name: String,
    extensible: bool,
    #[serde(default)]
    variable_mappings: Vec<String>,
    terms: Vec<Term>,
}

#[derive(Debug, Deserialize)]
struct CtBundle {
    ct_version: String,
    codelists: Vec<CtBundleCodelist>,
}

/// Parse the domain bundle, returning the declared IG version and specs.
pub fn parse_domain_bundle(json: &str) -> Result<(String, Vec<DomainSpec>), StandardsError> {
    let bundle: DomainBundle =
        serde_json::from_str(json).map_err(|source| StandardsError::Parse {
            path: "sdtmig.json".to_string(),
            source,
        })?;
    Ok((bundle.ig_version, bundle.domains))
}

/// Parse the CT bundle into a catalog.
pub fn parse_ct_bundle(json: &str) -> Result<CtCatalog, StandardsError> {
    let bundle: CtBundle =
        serde_json::from_str(json).map_err(|source| StandardsError::Parse {
            path: "ct.json".to_string(),
            source,
        })?;

    let mut catalog = CtCatalog {
        version: bundle.ct_version,
        codelists: Default::default(),
    };
    for entry in bundle.codelists {
        let mut codelist = Codelist::new(entry.code, entry.name, entry.extensible);
        codelist.variable_mappings = entry
            .variable_mappings
            .into_iter()
            .map(|v| v.to_uppercase())
            .collect();
        for term in entry.terms {
            codelist.add_term(term);
        }
        catalog.add(codelist);
    }
    Ok(catalog)
}
