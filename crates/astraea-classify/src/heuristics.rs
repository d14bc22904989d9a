//! Stage 1: deterministic heuristic scoring.

use std::collections::BTreeMap;

use astraea_model::{DatasetProfile, DomainSpec};

/// Score a filename-bounded substring match gets.
const BOUNDED_MATCH_SCORE: f64 = 0.7;

/// Heuristic scores for one dataset against every candidate domain.
#[derive(Debug, Clone)]
pub struct HeuristicScores {
    /// Dataset name the scores belong to.
    pub dataset_name: String,

    /// Combined score per domain: max(filename, overlap).
    pub scores: BTreeMap<String, f64>,
}

impl HeuristicScores {
    /// The best-scoring domain, when any scored above zero.
    pub fn top(&self) -> Option<(&str, f64)> {
        self.scores
            .iter()
            .filter(|(_, score)| **score > 0.0)
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(domain, score)| (domain.as_str(), *score))
    }
}

/// Filename score for a domain token.
///
/// Exact match (ignoring case) scores 1.0. Otherwise the token must appear
/// bounded: the character before it must be start-of-string or underscore
/// (a digit is NOT a valid left boundary, so `data` never matches DA), and
/// the character after it must be end-of-string, underscore, or a digit
/// (so `ds2` matches DS). Bounded matches score 0.7.
pub fn filename_score(dataset_name: &str, domain: &str) -> f64 {
    let name = dataset_name.to_uppercase();
    let token = domain.to_uppercase();

    if name == token {
        return 1.0;
    }

    let bytes = name.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = name[search_from..].find(&token) {
        let start = search_from + offset;
        let end = start + token.len();

        let left_ok = start == 0 || bytes[start - 1] == b'_';
        let right_ok = end == bytes.len()
            || bytes[end] == b'_'
            || bytes[end].is_ascii_digit();

        if left_ok && right_ok {
            return BOUNDED_MATCH_SCORE;
        }
        search_from = start + 1;
    }

    0.0
}

/// Variable-overlap score: the share of the domain's distinctive variables
/// present among the dataset's clinical columns.
///
/// STUDYID, DOMAIN, and USUBJID are excluded from both sides; EDC system
/// columns are excluded from the raw side.
pub fn variable_overlap_score(profile: &DatasetProfile, spec: &DomainSpec) -> f64 {
    let reference = spec.distinctive_variable_names();
    if reference.is_empty() {
        return 0.0;
    }

    let clinical: Vec<String> = profile
        .clinical_columns()
        .iter()
        .map(|c| c.to_uppercase())
        .filter(|c| !matches!(c.as_str(), "STUDYID" | "DOMAIN" | "USUBJID"))
        .collect();

    let hits = reference
        .iter()
        .filter(|name| clinical.iter().any(|c| c == &name.to_uppercase()))
        .count();

    hits as f64 / reference.len() as f64
}

/// Combined per-domain heuristic scores for one dataset.
pub fn score_dataset(profile: &DatasetProfile, specs: &[&DomainSpec]) -> HeuristicScores {
    let mut scores = BTreeMap::new();
    for spec in specs {
        let by_name = filename_score(&profile.dataset_name, &spec.domain);
        let by_overlap = variable_overlap_score(profile, spec);
        let score = by_name.max(by_overlap);
        if score > 0.0 {
            scores.insert(spec.domain.clone(), score);
        }
    }
    HeuristicScores {
        dataset_name: profile.dataset_name.clone(),
        scores,
    }
}

/// Group datasets that share an underscore prefix (e.g. `lb_biochem`,
/// `lb_hem`, `lb_urin` form the LB merge group).
pub fn merge_groups(dataset_names: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for name in dataset_names {
        if let Some((prefix, _)) = name.split_once('_') {
            groups
                .entry(prefix.to_lowercase())
                .or_default()
                .push(name.clone());
        }
    }
    groups.retain(|_, members| members.len() > 1);
    for members in groups.values_mut() {
        members.sort();
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_filename_match_scores_one() {
        assert_eq!(filename_score("ae", "AE"), 1.0);
        assert_eq!(filename_score("DM", "DM"), 1.0);
    }

    #[test]
    fn digit_is_a_valid_right_boundary() {
        assert_eq!(filename_score("ds2", "DS"), 0.7);
    }

    #[test]
    fn digit_is_not_a_valid_left_boundary_and_letters_never_bound() {
        // `data` must not match DA: 'T' after DA is not a boundary.
        assert_eq!(filename_score("data", "DA"), 0.0);
        // `1dm` must not match DM from a digit boundary on the left.
        assert_eq!(filename_score("1dm", "DM"), 0.0);
    }

    #[test]
    fn underscore_bounds_match() {
        assert_eq!(filename_score("raw_dm", "DM"), 0.7);
        assert_eq!(filename_score("dm_final", "DM"), 0.7);
        assert_eq!(filename_score("study_lb_chem", "LB"), 0.7);
    }

    #[test]
    fn merge_groups_require_shared_prefix() {
        let names = vec![
            "lb_biochem".to_string(),
            "lb_hem".to_string(),
            "lb_urin".to_string(),
            "dm".to_string(),
            "vs_main".to_string(),
        ];
        let groups = merge_groups(&names);
        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups.get("lb").unwrap(),
            &vec![
                "lb_biochem".to_string(),
                "lb_hem".to_string(),
                "lb_urin".to_string()
            ]
        );
    }
}
