//! The learning retriever.
//!
//! Approved mappings and reviewer corrections are stored in two
//! collections with embeddings computed through the language-model
//! contract. Retrieval is cosine similarity with corrections prioritized,
//! feeding few-shot examples back into the mapping agent's prompt.
//! Example ids are deterministic, so re-ingesting a session is a no-op.

#![deny(unsafe_code)]

mod error;
mod retrieve;
mod store;
mod templates;

pub use crate::error::LearnError;
pub use crate::retrieve::{MAX_CORRECTIONS, render_example, retrieve_examples};
pub use crate::store::{Collection, LearningStore};
pub use crate::templates::update_template;
