//! Language-model client contract.
//!
//! The pipeline talks to the model through the [`LanguageModel`] trait, so
//! tests substitute deterministic fakes. [`HttpLanguageModel`] is the real
//! client: blocking HTTP with per-call timeouts and bounded retry.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AgentError;

/// Environment variable carrying the API credential.
pub const API_KEY_VAR: &str = "ASTRAEA_API_KEY";

/// A completion request.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    /// System prompt constraining the model.
    pub system: String,

    /// User prompt with the task content.
    pub user: String,

    /// Sampling temperature.
    pub temperature: f64,

    /// Maximum tokens to generate.
    pub max_tokens: u32,
}

impl CompletionRequest {
    /// A request with the pipeline's deterministic defaults.
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens: 4096,
        }
    }
}

/// The model contract the pipeline depends on.
pub trait LanguageModel {
    /// Run a completion and return the raw text output.
    fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError>;

    /// Embed a text for similarity retrieval.
    fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// HTTP client configuration.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Completion endpoint URL.
    pub completion_url: String,

    /// Embedding endpoint URL.
    pub embedding_url: String,

    /// Model identifier sent with each request.
    pub model: String,

    /// Embedding model identifier.
    pub embedding_model: String,

    /// Per-call timeout.
    pub timeout: Duration,

    /// Maximum attempts per call (first try included).
    pub max_attempts: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            completion_url: "https://api.astraea-llm.example/v1/complete".to_string(),
            embedding_url: "https://api.astraea-llm.example/v1/embed".to_string(),
            model: "astraea-mapper-1".to_string(),
            embedding_model: "astraea-embed-1".to_string(),
            timeout: Duration::from_secs(120),
            max_attempts: 3,
        }
    }
}

/// Blocking HTTP language-model client.
pub struct HttpLanguageModel {
    client: reqwest::blocking::Client,
    config: LlmConfig,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    system: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    output: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingBody<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpLanguageModel {
    /// Build a client, reading the credential from the environment.
    ///
    /// Fails fast with a clear message when the credential is absent, so a
    /// misconfigured run stops before any work is done.
    pub fn from_env(config: LlmConfig) -> Result<Self, AgentError> {
        let api_key = resolve_credential(std::env::var(API_KEY_VAR).ok())?;

        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AgentError::RequestExhausted {
                attempts: 0,
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    /// POST a JSON body with bounded exponential-backoff retry.
    ///
    /// 4xx responses are malformed requests: retrying cannot help, so they
    /// fail immediately. Everything else (timeouts, 5xx, transport errors)
    /// retries up to `max_attempts` with doubling delay.
    fn post_with_retry<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<R, AgentError> {
        let mut delay = Duration::from_millis(500);
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            let result = self
                .client
                .post(url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send();

            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_client_error() {
                        let message = response.text().unwrap_or_default();
                        return Err(AgentError::BadRequest {
                            status: status.as_u16(),
                            message,
                        });
                    }
                    if status.is_success() {
                        return response.json::<R>().map_err(|e| {
                            AgentError::MalformedOutput(format!("invalid response body: {e}"))
                        });
                    }
                    last_error = format!("server returned {status}");
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < self.config.max_attempts {
                warn!(attempt, error = %last_error, "LLM call failed, backing off");
                thread::sleep(delay);
                delay *= 2;
            }
        }

        Err(AgentError::RequestExhausted {
            attempts: self.config.max_attempts,
            message: last_error,
        })
    }
}

impl LanguageModel for HttpLanguageModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, AgentError> {
        debug!(model = %self.config.model, "LLM completion");
        let body = CompletionBody {
            model: &self.config.model,
            system: &request.system,
            prompt: &request.user,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };
        let response: CompletionResponse =
            self.post_with_retry(&self.config.completion_url, &body)?;
        Ok(response.output)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        let body = EmbeddingBody {
            model: &self.config.embedding_model,
            input: text,
        };
        let response: EmbeddingResponse =
            self.post_with_retry(&self.config.embedding_url, &body)?;
        Ok(response.embedding)
    }
}

/// Reject absent or blank credentials.
fn resolve_credential(value: Option<String>) -> Result<String, AgentError> {
    value
        .filter(|k| !k.trim().is_empty())
        .ok_or(AgentError::MissingCredential { var: API_KEY_VAR })
}

/// Strip a Markdown code fence around a JSON payload, when present.
///
/// Models frequently wrap JSON in ```json fences even when told not to;
/// tolerating the fence costs nothing and avoids a useless failure.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(rest, str::trim_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fences() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}\n");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}\n");
    }

    #[test]
    fn missing_credential_fails_fast() {
        assert!(matches!(
            resolve_credential(None),
            Err(AgentError::MissingCredential { .. })
        ));
        assert!(matches!(
            resolve_credential(Some("   ".to_string())),
            Err(AgentError::MissingCredential { .. })
        ));
        assert_eq!(resolve_credential(Some("key".to_string())).unwrap(), "key");
    }
}
