//! Domain classification output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Sentinel used when no domain reaches the confidence floor.
pub const UNCLASSIFIED: &str = "UNCLASSIFIED";

/// Classification of one raw dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainClassification {
    /// Raw dataset name (filename stem, lowercase).
    pub dataset_name: String,

    /// The chosen domain code, or `UNCLASSIFIED`.
    pub primary_domain: String,

    /// Additional domains the dataset may feed (e.g., DS from a DM file).
    #[serde(default)]
    pub secondary_domains: Vec<String>,

    /// Other raw datasets that should merge into the same domain.
    #[serde(default)]
    pub merge_candidates: Vec<String>,

    /// Final confidence after fusion adjustments, in [0, 1].
    pub confidence: f64,

    /// Model reasoning, for the reviewer.
    pub reasoning: String,

    /// Stage-1 heuristic scores per candidate domain.
    #[serde(default)]
    pub heuristic_scores: BTreeMap<String, f64>,
}

impl DomainClassification {
    /// Whether the dataset could not be classified.
    pub fn is_unclassified(&self) -> bool {
        self.primary_domain == UNCLASSIFIED
    }
}

/// How source datasets map onto a target domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingPatternKind {
    /// One dataset, one domain.
    Direct,
    /// Several datasets stacked into one domain.
    Merge,
    /// Wide findings data restructured to tall.
    Transpose,
    /// Merge followed by transpose.
    Mixed,
}

/// Execution plan for one target domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainPlan {
    /// Target SDTM domain code.
    pub target_domain: String,

    /// Contributing raw datasets, in stacking order.
    pub source_datasets: Vec<String>,

    /// Overall source-to-domain shape.
    pub mapping_pattern: MappingPatternKind,
}
