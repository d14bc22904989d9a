//! Similarity retrieval for few-shot prompting.

use astraea_agent::LanguageModel;
use astraea_model::LearningExample;

use crate::error::LearnError;
use crate::store::{Collection, LearningStore};

/// Corrections retrieved ahead of approved examples, at most this many.
pub const MAX_CORRECTIONS: usize = 3;

/// Retrieve up to `limit` examples similar to the query text.
///
/// Corrections come first (they encode what the model got wrong before),
/// capped at [`MAX_CORRECTIONS`]; approved mappings fill the rest.
pub fn retrieve_examples<M: LanguageModel + ?Sized>(
    store: &LearningStore,
    model: &M,
    query: &str,
    limit: usize,
) -> Result<Vec<LearningExample>, LearnError> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let query_embedding = model.embed(query)?;

    let mut corrections = ranked(store, Collection::Corrections, &query_embedding)?;
    corrections.truncate(MAX_CORRECTIONS.min(limit));

    let mut out = corrections;
    if out.len() < limit {
        let approved = ranked(store, Collection::Approved, &query_embedding)?;
        for example in approved {
            if out.len() >= limit {
                break;
            }
            if !out.iter().any(|e| e.example_id == example.example_id) {
                out.push(example);
            }
        }
    }
    Ok(out)
}

fn ranked(
    store: &LearningStore,
    collection: Collection,
    query: &[f32],
) -> Result<Vec<LearningExample>, LearnError> {
    let mut scored: Vec<(f64, LearningExample)> = store
        .all(collection)?
        .into_iter()
        .map(|(example, embedding)| (cosine_similarity(query, &embedding), example))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    Ok(scored.into_iter().map(|(_, example)| example).collect())
}

/// Cosine similarity; zero vectors score 0.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let len = a.len().min(b.len());
    if len == 0 {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..len {
        dot += a[i] as f64 * b[i] as f64;
        norm_a += (a[i] as f64).powi(2);
        norm_b += (b[i] as f64).powi(2);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Render one example as a prompt line.
pub fn render_example(example: &LearningExample) -> String {
    let marker = if example.was_corrected {
        let reason = example
            .correction_reason
            .as_deref()
            .unwrap_or("reviewer correction");
        format!(" [corrected: {reason}]")
    } else {
        String::new()
    };
    let rule = example.derivation_rule.as_deref().unwrap_or("-");
    format!(
        "{}: {} <- {} via {} rule {}{}",
        example.domain,
        example.sdtm_variable,
        example.source_variable,
        example.pattern,
        rule,
        marker,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use astraea_agent::{AgentError, CompletionRequest};
    use astraea_model::MappingPattern;
    use chrono::Utc;

    struct HashEmbedder;

    impl LanguageModel for HashEmbedder {
        fn complete(&self, _request: &CompletionRequest) -> Result<String, AgentError> {
            Ok(String::new())
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
            let mut v = vec![0.0f32; 16];
            for (i, b) in text.bytes().enumerate() {
                v[(b as usize + i) % 16] += 1.0;
            }
            Ok(v)
        }
    }

    fn example(study: &str, variable: &str, corrected: bool) -> LearningExample {
        LearningExample {
            example_id: LearningExample::make_id(study, "DM", variable),
            study_id: study.to_string(),
            domain: "DM".to_string(),
            sdtm_variable: variable.to_string(),
            source_variable: "Subject".to_string(),
            pattern: MappingPattern::Direct,
            derivation_rule: None,
            was_corrected: corrected,
            correction_reason: corrected.then(|| "wrong source".to_string()),
            embedded_text: format!("source Subject maps to {variable} in DM"),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn corrections_come_first_and_are_capped() {
        let mut store = LearningStore::open_in_memory().unwrap();
        for idx in 0..5 {
            store
                .ingest(
                    Collection::Corrections,
                    &example("S1", &format!("VAR{idx}"), true),
                    &HashEmbedder,
                )
                .unwrap();
        }
        for idx in 0..5 {
            store
                .ingest(
                    Collection::Approved,
                    &example("S2", &format!("OK{idx}"), false),
                    &HashEmbedder,
                )
                .unwrap();
        }

        let results =
            retrieve_examples(&store, &HashEmbedder, "map subject identifier", 5).unwrap();
        assert_eq!(results.len(), 5);
        assert!(results[..MAX_CORRECTIONS].iter().all(|e| e.was_corrected));
        assert!(results[MAX_CORRECTIONS..].iter().all(|e| !e.was_corrected));
    }

    #[test]
    fn respects_limit() {
        let mut store = LearningStore::open_in_memory().unwrap();
        for idx in 0..10 {
            store
                .ingest(
                    Collection::Approved,
                    &example("S1", &format!("VAR{idx}"), false),
                    &HashEmbedder,
                )
                .unwrap();
        }
        let results = retrieve_examples(&store, &HashEmbedder, "anything", 4).unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn rendering_marks_corrections() {
        let text = render_example(&example("S1", "SEX", true));
        assert!(text.contains("[corrected: wrong source]"));
    }
}
