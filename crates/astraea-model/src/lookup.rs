//! Case-insensitive name lookups.
//!
//! SDTM variable matching treats "USUBJID", "usubjid", and "Usubjid" as the
//! same name while preserving the source casing in output.

use std::collections::HashMap;

/// A set with case-insensitive lookup that preserves original casing.
#[derive(Debug, Clone)]
pub struct CaseInsensitiveSet {
    map: HashMap<String, String>,
}

impl CaseInsensitiveSet {
    /// Create a set from an iterator of names. The first occurrence of each
    /// name (case-insensitively) wins.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for name in names {
            let name = name.as_ref();
            map.entry(name.to_ascii_uppercase())
                .or_insert_with(|| name.to_string());
        }
        Self { map }
    }

    /// Get the original-cased name for a case-insensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// Whether a name exists (case-insensitive).
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(&name.to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_original_case() {
        let set = CaseInsensitiveSet::new(["Subject", "SiteNumber"]);
        assert_eq!(set.get("SUBJECT"), Some("Subject"));
        assert_eq!(set.get("sitenumber"), Some("SiteNumber"));
        assert!(!set.contains("SITEGROUP"));
    }
}
