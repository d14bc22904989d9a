//! Validation entities: rule results, reports, and the false-positive
//! whitelist.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{RuleCategory, Severity};

/// One validation finding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResult {
    /// Stable rule identifier (e.g., "ASTR-T001", "FDA-TRC-1734").
    pub rule_id: String,

    /// What the rule checks.
    pub rule_description: String,

    /// Rule category.
    pub category: RuleCategory,

    /// Finding severity.
    pub severity: Severity,

    /// Domain the finding concerns, when domain-scoped.
    #[serde(default)]
    pub domain: Option<String>,

    /// Variable the finding concerns, when variable-scoped.
    #[serde(default)]
    pub variable: Option<String>,

    /// Human-readable message.
    pub message: String,

    /// Number of affected rows/values.
    pub affected_count: u64,

    /// Suggested fix, when the rule has one.
    #[serde(default)]
    pub fix_suggestion: Option<String>,

    /// Equivalent Pinnacle 21 rule id, for cross-reference.
    #[serde(default)]
    pub p21_equivalent: Option<String>,

    /// Set when a whitelist entry matches this finding.
    #[serde(default)]
    pub known_false_positive: bool,

    /// The whitelist reason, when flagged.
    #[serde(default)]
    pub known_false_positive_reason: Option<String>,
}

impl RuleResult {
    /// Whether this finding counts against submission readiness.
    pub fn is_effective_error(&self) -> bool {
        self.severity == Severity::Error && !self.known_false_positive
    }
}

/// Validation results for one domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainValidation {
    /// Findings for the domain, in rule order.
    pub results: Vec<RuleResult>,
}

impl DomainValidation {
    /// Errors that are not whitelisted.
    pub fn effective_error_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_effective_error()).count()
    }
}

/// A whitelist entry marking a known false positive.
///
/// Matching: `rule_id` must match exactly; `domain` and `variable` match
/// when absent, `"*"`, or equal to the finding's value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    /// Rule id to suppress.
    pub rule_id: String,

    /// Domain filter.
    #[serde(default)]
    pub domain: Option<String>,

    /// Variable filter.
    #[serde(default)]
    pub variable: Option<String>,

    /// Why the finding is a false positive.
    pub reason: String,
}

impl WhitelistEntry {
    /// Whether this entry suppresses the given finding.
    pub fn matches(&self, result: &RuleResult) -> bool {
        if self.rule_id != result.rule_id {
            return false;
        }
        field_matches(self.domain.as_deref(), result.domain.as_deref())
            && field_matches(self.variable.as_deref(), result.variable.as_deref())
    }
}

fn field_matches(filter: Option<&str>, value: Option<&str>) -> bool {
    match filter {
        None => true,
        Some("*") => true,
        Some(expected) => value.is_some_and(|v| v.eq_ignore_ascii_case(expected)),
    }
}

/// The study-level validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Per-domain results.
    pub domains: BTreeMap<String, DomainValidation>,

    /// Findings not attached to a single domain (package-level, cross-domain).
    #[serde(default)]
    pub study_results: Vec<RuleResult>,

    /// Percentage of domains with zero effective errors.
    pub pass_rate: f64,

    /// Error findings excluding whitelisted ones.
    pub effective_error_count: usize,

    /// True exactly when `effective_error_count == 0`.
    pub submission_ready: bool,

    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

impl ValidationReport {
    /// Build a report from findings, recomputing the aggregates.
    pub fn from_results(
        domains: BTreeMap<String, DomainValidation>,
        study_results: Vec<RuleResult>,
    ) -> Self {
        let mut report = Self {
            domains,
            study_results,
            pass_rate: 0.0,
            effective_error_count: 0,
            submission_ready: false,
            generated_at: Utc::now(),
        };
        report.recompute();
        report
    }

    /// Recompute pass rate, effective error count, and submission readiness.
    /// Call after whitelist application or auto-fix mutation.
    pub fn recompute(&mut self) {
        let study_errors = self
            .study_results
            .iter()
            .filter(|r| r.is_effective_error())
            .count();
        let domain_errors: usize = self
            .domains
            .values()
            .map(DomainValidation::effective_error_count)
            .sum();
        self.effective_error_count = study_errors + domain_errors;

        if self.domains.is_empty() {
            self.pass_rate = 0.0;
        } else {
            let passing = self
                .domains
                .values()
                .filter(|d| d.effective_error_count() == 0)
                .count();
            self.pass_rate = passing as f64 * 100.0 / self.domains.len() as f64;
        }

        self.submission_ready = self.effective_error_count == 0;
    }

    /// Every finding, domain-scoped and study-scoped.
    pub fn all_results(&self) -> impl Iterator<Item = &RuleResult> {
        self.domains
            .values()
            .flat_map(|d| d.results.iter())
            .chain(self.study_results.iter())
    }

    /// Every finding, mutably.
    pub fn all_results_mut(&mut self) -> impl Iterator<Item = &mut RuleResult> {
        self.domains
            .values_mut()
            .flat_map(|d| d.results.iter_mut())
            .chain(self.study_results.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(rule_id: &str, domain: Option<&str>, variable: Option<&str>) -> RuleResult {
        RuleResult {
            rule_id: rule_id.to_string(),
            rule_description: String::new(),
            category: RuleCategory::Terminology,
            severity: Severity::Error,
            domain: domain.map(str::to_string),
            variable: variable.map(str::to_string),
            message: String::new(),
            affected_count: 1,
            fix_suggestion: None,
            p21_equivalent: None,
            known_false_positive: false,
            known_false_positive_reason: None,
        }
    }

    #[test]
    fn whitelist_wildcard_domain_matches_all() {
        let entry = WhitelistEntry {
            rule_id: "SD1076".to_string(),
            domain: Some("*".to_string()),
            variable: Some("LBSTRESC".to_string()),
            reason: "P21 v2405.2".to_string(),
        };
        assert!(entry.matches(&error("SD1076", Some("LB"), Some("LBSTRESC"))));
        assert!(entry.matches(&error("SD1076", Some("EG"), Some("LBSTRESC"))));
        assert!(!entry.matches(&error("SD1076", Some("LB"), Some("LBORRES"))));
        assert!(!entry.matches(&error("SD1080", Some("LB"), Some("LBSTRESC"))));
    }

    #[test]
    fn submission_ready_tracks_effective_errors() {
        let mut domains = BTreeMap::new();
        domains.insert(
            "LB".to_string(),
            DomainValidation {
                results: vec![error("ASTR-T001", Some("LB"), Some("LBSTRESC"))],
            },
        );
        let mut report = ValidationReport::from_results(domains, Vec::new());
        assert_eq!(report.effective_error_count, 1);
        assert!(!report.submission_ready);

        for result in report.all_results_mut() {
            result.known_false_positive = true;
        }
        report.recompute();
        assert_eq!(report.effective_error_count, 0);
        assert!(report.submission_ready);
        assert_eq!(report.pass_rate, 100.0);
    }
}
