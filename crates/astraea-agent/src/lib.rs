//! The mapping agent and its supporting contracts.
//!
//! This crate owns the language-model client contract, the closed
//! derivation-rule vocabulary shared with the execution engine, the
//! per-domain mapping proposal step, reference enrichment, and the
//! predict-and-prevent checks that run on a spec before execution.

#![deny(unsafe_code)]

mod enrich;
mod error;
mod llm;
mod prevent;
mod prompt;
mod propose;
mod rules;

pub use crate::enrich::enrich_spec;
pub use crate::error::AgentError;
pub use crate::llm::{
    CompletionRequest, HttpLanguageModel, LanguageModel, LlmConfig, strip_code_fence,
};
pub use crate::prevent::predict_and_prevent;
pub use crate::prompt::{MappingPromptInput, build_mapping_prompt};
pub use crate::propose::{MappingAgent, ProposalContext};
pub use crate::rules::{DerivationRule, VOCABULARY_KEYWORDS};
