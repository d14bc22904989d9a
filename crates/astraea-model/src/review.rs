//! Human review entities.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{CorrectionType, ReviewStatus};
use crate::mapping::VariableMapping;

/// One reviewer decision, captured as a structured correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanCorrection {
    /// Index of the variable within the presented spec (1-based).
    pub variable_index: u32,

    /// What the reviewer did.
    pub correction_type: CorrectionType,

    /// The mapping as proposed. For ADD decisions this is the added mapping.
    pub original_mapping: VariableMapping,

    /// The replacement mapping, present only for MODIFY.
    #[serde(default)]
    pub corrected_mapping: Option<VariableMapping>,

    /// Free-text reason the reviewer gave.
    #[serde(default)]
    pub reason: Option<String>,

    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
}

/// Per-variable decision as persisted in the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewDecision {
    /// Target SDTM variable.
    pub sdtm_variable: String,

    /// The captured correction.
    pub correction: HumanCorrection,
}

/// Review state for one domain within a session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainReview {
    /// Progress state.
    pub status: ReviewStatus,

    /// Decisions keyed by uppercase SDTM variable name.
    pub decisions: BTreeMap<String, ReviewDecision>,
}

/// A persisted review session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSession {
    /// Session identifier.
    pub session_id: String,

    /// Study the session belongs to.
    pub study_id: String,

    /// Per-domain review state.
    pub domain_reviews: BTreeMap<String, DomainReview>,

    /// Session creation time.
    pub created_at: DateTime<Utc>,

    /// Last decision time.
    pub updated_at: DateTime<Utc>,
}

impl ReviewSession {
    /// The first domain that is not COMPLETED, in alphabetical order.
    /// Resume continues from here.
    pub fn next_open_domain(&self) -> Option<&str> {
        self.domain_reviews
            .iter()
            .find(|(_, review)| review.status != ReviewStatus::Completed)
            .map(|(domain, _)| domain.as_str())
    }
}
