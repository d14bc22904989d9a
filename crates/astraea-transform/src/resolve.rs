//! Column-name resolution.
//!
//! The agent proposes mappings in eCRF/IRT field names while the raw data
//! carries EDC export column names. Any token reaching the engine walks
//! the same chain: dataset-prefix strip, exact match, study alias map,
//! standard EDC aliases, case-insensitive fallback.

use std::collections::BTreeMap;

use polars::prelude::DataFrame;

use astraea_model::CaseInsensitiveSet;

/// The standard EDC alias map: canonical token to export column name.
pub fn standard_edc_aliases() -> BTreeMap<String, String> {
    [
        ("SSUBJID", "Subject"),
        ("SSITENUM", "SiteNumber"),
        ("SSITE", "Site"),
        ("SSITEGROUP", "SiteGroup"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Resolves mapping tokens to actual DataFrame column names.
pub struct ColumnResolver {
    columns: CaseInsensitiveSet,
    custom_aliases: BTreeMap<String, String>,
    edc_aliases: BTreeMap<String, String>,
}

impl ColumnResolver {
    /// Build a resolver for one DataFrame plus the study's alias map.
    pub fn new(df: &DataFrame, custom_aliases: &BTreeMap<String, String>) -> Self {
        Self {
            columns: CaseInsensitiveSet::new(
                df.get_column_names().iter().map(|n| n.as_str()),
            ),
            custom_aliases: custom_aliases
                .iter()
                .map(|(k, v)| (k.to_uppercase(), v.clone()))
                .collect(),
            edc_aliases: standard_edc_aliases(),
        }
    }

    /// Resolve a token to a column name in the frame, or None.
    ///
    /// Chain: strip a `dataset.` prefix, exact match, study alias map,
    /// standard EDC aliases, then case-insensitive match.
    pub fn resolve(&self, token: &str) -> Option<&str> {
        let token = token.trim();
        let bare = token.rsplit_once('.').map_or(token, |(_, t)| t);

        if let Some(name) = self.columns.get(bare)
            && name == bare
        {
            return Some(name);
        }

        if let Some(alias) = self.custom_aliases.get(&bare.to_uppercase())
            && let Some(name) = self.columns.get(alias)
        {
            return Some(name);
        }

        if let Some(alias) = self.edc_aliases.get(&bare.to_uppercase())
            && let Some(name) = self.columns.get(alias)
        {
            return Some(name);
        }

        self.columns.get(bare)
    }

    /// Whether a token resolves at all. CONCAT uses this to tell columns
    /// from literal separators.
    pub fn is_column(&self, token: &str) -> bool {
        self.resolve(token).is_some()
    }
}
