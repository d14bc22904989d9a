//! SQLite-backed example storage with embedded vectors.

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::debug;

use astraea_agent::LanguageModel;
use astraea_model::{LearningExample, MappingPattern};

use crate::error::LearnError;

/// The two example collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    /// Accepted proposals, ingested after execution.
    Approved,

    /// Reviewer MODIFY decisions.
    Corrections,
}

impl Collection {
    fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved_mappings",
            Self::Corrections => "corrections",
        }
    }
}

/// The learning store (`.astraea/learning/examples.db`).
pub struct LearningStore {
    conn: Connection,
}

impl LearningStore {
    /// Open (or create) the learning database.
    pub fn open(path: &Path) -> Result<Self, LearnError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, LearnError> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn })
    }

    fn init(conn: &Connection) -> Result<(), LearnError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS examples (
                 example_id        TEXT NOT NULL,
                 collection        TEXT NOT NULL,
                 study_id          TEXT NOT NULL,
                 domain            TEXT NOT NULL,
                 sdtm_variable     TEXT NOT NULL,
                 source_variable   TEXT NOT NULL,
                 pattern           TEXT NOT NULL,
                 derivation_rule   TEXT,
                 was_corrected     TEXT NOT NULL,
                 correction_reason TEXT,
                 embedded_text     TEXT NOT NULL,
                 embedding         BLOB NOT NULL,
                 stored_at         TEXT NOT NULL,
                 PRIMARY KEY (example_id, collection)
             );
             CREATE TABLE IF NOT EXISTS templates (
                 domain     TEXT PRIMARY KEY,
                 template_json TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );",
        )?;
        Ok(())
    }

    /// Ingest one example into a collection.
    ///
    /// The deterministic id makes this idempotent: re-running a session's
    /// ingestion replaces rather than duplicates. Boolean metadata is
    /// stored as the strings "true"/"false".
    pub fn ingest<M: LanguageModel + ?Sized>(
        &mut self,
        collection: Collection,
        example: &LearningExample,
        model: &M,
    ) -> Result<(), LearnError> {
        let embedding = model.embed(&example.embedded_text)?;
        let blob = embedding_to_blob(&embedding);

        self.conn.execute(
            "INSERT OR REPLACE INTO examples
                 (example_id, collection, study_id, domain, sdtm_variable,
                  source_variable, pattern, derivation_rule, was_corrected,
                  correction_reason, embedded_text, embedding, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                example.example_id,
                collection.as_str(),
                example.study_id,
                example.domain,
                example.sdtm_variable,
                example.source_variable,
                example.pattern.to_string(),
                example.derivation_rule,
                if example.was_corrected { "true" } else { "false" },
                example.correction_reason,
                example.embedded_text,
                blob,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(
            example_id = %example.example_id,
            collection = collection.as_str(),
            "example ingested"
        );
        Ok(())
    }

    /// All examples of a collection with their embeddings.
    pub fn all(
        &self,
        collection: Collection,
    ) -> Result<Vec<(LearningExample, Vec<f32>)>, LearnError> {
        let mut stmt = self.conn.prepare(
            "SELECT example_id, study_id, domain, sdtm_variable, source_variable,
                    pattern, derivation_rule, was_corrected, correction_reason,
                    embedded_text, embedding, stored_at
             FROM examples WHERE collection = ?1",
        )?;
        let rows = stmt.query_map(params![collection.as_str()], |row| {
            let pattern_text: String = row.get(5)?;
            let was_corrected: String = row.get(7)?;
            let blob: Vec<u8> = row.get(10)?;
            let stored_at: String = row.get(11)?;
            Ok((
                LearningExample {
                    example_id: row.get(0)?,
                    study_id: row.get(1)?,
                    domain: row.get(2)?,
                    sdtm_variable: row.get(3)?,
                    source_variable: row.get(4)?,
                    pattern: pattern_text
                        .parse::<MappingPattern>()
                        .unwrap_or(MappingPattern::Direct),
                    derivation_rule: row.get(6)?,
                    was_corrected: was_corrected == "true",
                    correction_reason: row.get(8)?,
                    embedded_text: row.get(9)?,
                    timestamp: chrono::DateTime::parse_from_rfc3339(&stored_at)
                        .map(|dt| dt.with_timezone(&Utc))
                        .unwrap_or_else(|_| Utc::now()),
                },
                blob_to_embedding(&blob),
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Number of examples in a collection.
    pub fn count(&self, collection: Collection) -> Result<usize, LearnError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM examples WHERE collection = ?1",
            params![collection.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Load a stored domain template, when one exists.
    pub fn template(
        &self,
        domain: &str,
    ) -> Result<Option<astraea_model::DomainTemplate>, LearnError> {
        let mut stmt = self
            .conn
            .prepare("SELECT template_json FROM templates WHERE domain = ?1")?;
        let mut rows = stmt.query(params![domain.to_uppercase()])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Store (or replace) a domain template.
    pub fn save_template(
        &mut self,
        template: &astraea_model::DomainTemplate,
    ) -> Result<(), LearnError> {
        let json = serde_json::to_string(template)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO templates (domain, template_json, updated_at)
             VALUES (?1, ?2, ?3)",
            params![
                template.domain.to_uppercase(),
                json,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_agent::{AgentError, CompletionRequest};

    pub(crate) struct HashEmbedder;

    impl LanguageModel for HashEmbedder {
        fn complete(&self, _request: &CompletionRequest) -> Result<String, AgentError> {
            Ok(String::new())
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
            // Deterministic toy embedding: character histogram buckets.
            let mut v = vec![0.0f32; 16];
            for (i, b) in text.bytes().enumerate() {
                v[(b as usize + i) % 16] += 1.0;
            }
            Ok(v)
        }
    }

    fn example(study: &str, variable: &str) -> LearningExample {
        LearningExample {
            example_id: LearningExample::make_id(study, "DM", variable),
            study_id: study.to_string(),
            domain: "DM".to_string(),
            sdtm_variable: variable.to_string(),
            source_variable: "Subject".to_string(),
            pattern: MappingPattern::Derivation,
            derivation_rule: Some("GENERATE_USUBJID".to_string()),
            was_corrected: false,
            correction_reason: None,
            embedded_text: LearningExample::embedding_text(
                "Subject",
                variable,
                MappingPattern::Derivation,
                Some("GENERATE_USUBJID"),
                "DM",
            ),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn ingestion_is_idempotent() {
        let mut store = LearningStore::open_in_memory().unwrap();
        let ex = example("STUDY01", "USUBJID");

        store.ingest(Collection::Approved, &ex, &HashEmbedder).unwrap();
        store.ingest(Collection::Approved, &ex, &HashEmbedder).unwrap();

        assert_eq!(store.count(Collection::Approved).unwrap(), 1);
    }

    #[test]
    fn collections_are_separate() {
        let mut store = LearningStore::open_in_memory().unwrap();
        store
            .ingest(Collection::Approved, &example("S1", "USUBJID"), &HashEmbedder)
            .unwrap();
        let mut corrected = example("S1", "SEX");
        corrected.was_corrected = true;
        store
            .ingest(Collection::Corrections, &corrected, &HashEmbedder)
            .unwrap();

        assert_eq!(store.count(Collection::Approved).unwrap(), 1);
        assert_eq!(store.count(Collection::Corrections).unwrap(), 1);

        let loaded = store.all(Collection::Corrections).unwrap();
        assert!(loaded[0].0.was_corrected);
        assert_eq!(loaded[0].1.len(), 16);
    }
}
