//! Durable review-session persistence over SQLite.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use astraea_model::{
    DomainReview, HumanCorrection, ReviewDecision, ReviewSession, ReviewStatus,
};

use crate::error::ReviewError;

/// The session database (`.astraea/sessions.db`).
///
/// Single-writer, many-reader: every decision lands in its own
/// transaction, so a crash after decision N preserves decisions 1..N.
pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    /// Open (or create) the session database.
    pub fn open(path: &Path) -> Result<Self, ReviewError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sessions (
                 session_id TEXT PRIMARY KEY,
                 study_id   TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS domain_reviews (
                 session_id TEXT NOT NULL,
                 domain     TEXT NOT NULL,
                 status     TEXT NOT NULL,
                 PRIMARY KEY (session_id, domain),
                 FOREIGN KEY (session_id) REFERENCES sessions(session_id)
             );
             CREATE TABLE IF NOT EXISTS decisions (
                 session_id    TEXT NOT NULL,
                 domain        TEXT NOT NULL,
                 sdtm_variable TEXT NOT NULL,
                 decision_json TEXT NOT NULL,
                 recorded_at   TEXT NOT NULL,
                 PRIMARY KEY (session_id, domain, sdtm_variable)
             );",
        )?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, ReviewError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE sessions (
                 session_id TEXT PRIMARY KEY,
                 study_id   TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );
             CREATE TABLE domain_reviews (
                 session_id TEXT NOT NULL,
                 domain     TEXT NOT NULL,
                 status     TEXT NOT NULL,
                 PRIMARY KEY (session_id, domain)
             );
             CREATE TABLE decisions (
                 session_id    TEXT NOT NULL,
                 domain        TEXT NOT NULL,
                 sdtm_variable TEXT NOT NULL,
                 decision_json TEXT NOT NULL,
                 recorded_at   TEXT NOT NULL,
                 PRIMARY KEY (session_id, domain, sdtm_variable)
             );",
        )?;
        Ok(Self { conn })
    }

    /// Create a session covering the given domains.
    pub fn create_session(
        &mut self,
        session_id: &str,
        study_id: &str,
        domains: &[String],
    ) -> Result<(), ReviewError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO sessions (session_id, study_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)",
            params![session_id, study_id, now],
        )?;
        for domain in domains {
            tx.execute(
                "INSERT INTO domain_reviews (session_id, domain, status)
                 VALUES (?1, ?2, ?3)",
                params![session_id, domain.to_uppercase(), ReviewStatus::Pending.as_str()],
            )?;
        }
        tx.commit()?;
        info!(session_id, study_id, domains = domains.len(), "review session created");
        Ok(())
    }

    /// Record one decision, durably, in its own transaction.
    pub fn record_decision(
        &mut self,
        session_id: &str,
        domain: &str,
        decision: &ReviewDecision,
    ) -> Result<(), ReviewError> {
        let now = Utc::now().to_rfc3339();
        let json = serde_json::to_string(decision)?;
        let domain = domain.to_uppercase();

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO decisions
                 (session_id, domain, sdtm_variable, decision_json, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                domain,
                decision.sdtm_variable.to_uppercase(),
                json,
                now
            ],
        )?;
        tx.execute(
            "UPDATE domain_reviews SET status = ?3
             WHERE session_id = ?1 AND domain = ?2 AND status = ?4",
            params![
                session_id,
                domain,
                ReviewStatus::InProgress.as_str(),
                ReviewStatus::Pending.as_str()
            ],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE session_id = ?1",
            params![session_id, now],
        )?;
        tx.commit()?;

        debug!(session_id, domain, variable = %decision.sdtm_variable, "decision recorded");
        Ok(())
    }

    /// Mark a domain's review state.
    pub fn set_domain_status(
        &mut self,
        session_id: &str,
        domain: &str,
        status: ReviewStatus,
    ) -> Result<(), ReviewError> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO domain_reviews (session_id, domain, status)
             VALUES (?1, ?2, ?3)",
            params![session_id, domain.to_uppercase(), status.as_str()],
        )?;
        tx.execute(
            "UPDATE sessions SET updated_at = ?2 WHERE session_id = ?1",
            params![session_id, now],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Load a full session, including every recorded decision.
    pub fn load_session(&self, session_id: &str) -> Result<ReviewSession, ReviewError> {
        let row = self
            .conn
            .query_row(
                "SELECT study_id, created_at, updated_at FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| ReviewError::SessionNotFound(session_id.to_string()))?;

        let mut session = ReviewSession {
            session_id: session_id.to_string(),
            study_id: row.0,
            domain_reviews: Default::default(),
            created_at: parse_time(&row.1),
            updated_at: parse_time(&row.2),
        };

        let mut stmt = self
            .conn
            .prepare("SELECT domain, status FROM domain_reviews WHERE session_id = ?1")?;
        let domains = stmt.query_map(params![session_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for entry in domains {
            let (domain, status) = entry?;
            session.domain_reviews.insert(
                domain,
                DomainReview {
                    status: status.parse().unwrap_or(ReviewStatus::Pending),
                    decisions: Default::default(),
                },
            );
        }

        let mut stmt = self.conn.prepare(
            "SELECT domain, sdtm_variable, decision_json FROM decisions WHERE session_id = ?1",
        )?;
        let decisions = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for entry in decisions {
            let (domain, variable, json) = entry?;
            let decision: ReviewDecision = serde_json::from_str(&json)?;
            session
                .domain_reviews
                .entry(domain)
                .or_default()
                .decisions
                .insert(variable, decision);
        }

        Ok(session)
    }

    /// List the corrections a session captured, for the learning store.
    pub fn corrections(
        &self,
        session_id: &str,
    ) -> Result<Vec<(String, HumanCorrection)>, ReviewError> {
        let session = self.load_session(session_id)?;
        let mut out = Vec::new();
        for (domain, review) in session.domain_reviews {
            for decision in review.decisions.into_values() {
                out.push((domain.clone(), decision.correction));
            }
        }
        Ok(out)
    }
}

fn parse_time(text: &str) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_model::{
        ConfidenceLevel, CorrectionType, MappingPattern, VariableMapping,
    };

    fn decision(variable: &str, index: u32) -> ReviewDecision {
        let mapping = VariableMapping {
            sdtm_variable: variable.to_string(),
            pattern: MappingPattern::Direct,
            source_dataset: Some("dm".to_string()),
            source_variable: Some(variable.to_string()),
            derivation_rule: None,
            confidence_level: ConfidenceLevel::High,
            confidence_score: 0.9,
            confidence_rationale: String::new(),
            order: None,
            length: None,
            label: None,
            data_type: None,
            core: None,
            codelist_code: None,
            codelist_name: None,
            origin: None,
            computational_method: None,
        };
        ReviewDecision {
            sdtm_variable: variable.to_string(),
            correction: HumanCorrection {
                variable_index: index,
                correction_type: CorrectionType::Accept,
                original_mapping: mapping,
                corrected_mapping: None,
                reason: None,
                timestamp: Utc::now(),
            },
        }
    }

    #[test]
    fn decisions_survive_interruption() {
        let mut store = SessionStore::open_in_memory().unwrap();
        store
            .create_session("sess-1", "301", &["DM".to_string(), "AE".to_string()])
            .unwrap();

        for (idx, var) in ["STUDYID", "USUBJID", "SEX", "AGE", "RACE"]
            .iter()
            .enumerate()
        {
            store
                .record_decision("sess-1", "DM", &decision(var, (idx + 1) as u32))
                .unwrap();
        }

        // "Crash": reload from the same store and resume.
        let session = store.load_session("sess-1").unwrap();
        let dm = session.domain_reviews.get("DM").unwrap();
        assert_eq!(dm.decisions.len(), 5);
        assert_eq!(dm.status, ReviewStatus::InProgress);
        assert!(dm.decisions.contains_key("SEX"));

        // Resume continues at the first non-completed domain.
        assert_eq!(session.next_open_domain(), Some("AE"));
    }

    #[test]
    fn completed_domains_are_skipped_on_resume() {
        let mut store = SessionStore::open_in_memory().unwrap();
        store
            .create_session("sess-2", "301", &["AE".to_string(), "DM".to_string()])
            .unwrap();
        store
            .set_domain_status("sess-2", "AE", ReviewStatus::Completed)
            .unwrap();

        let session = store.load_session("sess-2").unwrap();
        assert_eq!(session.next_open_domain(), Some("DM"));
    }

    #[test]
    fn unknown_session_is_an_error() {
        let store = SessionStore::open_in_memory().unwrap();
        assert!(matches!(
            store.load_session("nope"),
            Err(ReviewError::SessionNotFound(_))
        ));
    }
}
