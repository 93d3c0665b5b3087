//! Provider Abstraction (C1): a uniform interface over embedding and
//! chat-completion backends, with credential resolution, a cooperative
//! rate-limit gate, and a bounded retry policy. Grounded on the
//! teacher's `embedding.rs` (`EmbeddingProvider` trait, the
//! `embed_openai` retry loop, and its vector helpers), generalized to
//! five backends per the closed `ProviderKind` sum type.

pub mod anthropic;
pub mod gemini;
pub mod lmstudio;
pub mod ollama;
pub mod openai;
pub mod ratelimit;

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use ratelimit::RateGate;

/// Maximum number of retry attempts for a transient failure, beyond the
/// initial attempt.
pub const MAX_RETRIES: u32 = 3;

/// A single chat turn, used for description validation and interactive
/// chat. Not on the hot search path.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Result of [`Provider::check`].
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub available: bool,
    pub reason: Option<String>,
    pub dimension: Option<usize>,
}

/// Capability interface implemented by each concrete backend.
///
/// A provider that does not support a capability (e.g. Anthropic has
/// no embedding endpoint) returns a [`MinervaError::ProviderError`]
/// from the default implementation rather than requiring every backend
/// to repeat the same boilerplate.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn model_name(&self) -> &str;

    /// Returns `len(texts)` L2-normalized vectors of equal dimension,
    /// preserving input order. May batch internally.
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(MinervaError::ProviderError {
            provider: self.kind().as_str().to_string(),
            message: "this provider does not support embeddings".to_string(),
        })
    }

    /// Runs a chat completion over `messages` at the given temperature.
    async fn complete(&self, _messages: &[ChatMessage], _temperature: f32) -> Result<String> {
        Err(MinervaError::ProviderError {
            provider: self.kind().as_str().to_string(),
            message: "this provider does not support chat completion".to_string(),
        })
    }

    /// Probes availability by embedding (or otherwise exercising) the
    /// literal string `"probe"`, reporting the resulting dimension when
    /// embeddings are supported.
    async fn check(&self) -> ProviderStatus;
}

/// Default embedding model per backend, mirroring the constant each
/// backend module falls back to when `embeddingModel` is unset.
pub fn default_embedding_model(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::Ollama => ollama::DEFAULT_EMBEDDING_MODEL,
        ProviderKind::Lmstudio => "",
        ProviderKind::Openai => openai::DEFAULT_EMBEDDING_MODEL,
        ProviderKind::Gemini => gemini::DEFAULT_EMBEDDING_MODEL,
        ProviderKind::Anthropic => "",
    }
}

/// Builds the concrete provider for `config`. Anthropic is chat-only;
/// selecting it for an indexing operation is caught by the orchestrator
/// when it calls `embed`, per the "fails at index time" rule.
pub fn build_provider(config: &ProviderConfig) -> Result<Box<dyn Provider>> {
    let gate = config.rate_limit.as_ref().map(RateGate::new);
    Ok(match config.provider_type {
        ProviderKind::Ollama => Box::new(ollama::OllamaProvider::new(config, gate)?),
        ProviderKind::Lmstudio => Box::new(lmstudio::LmStudioProvider::new(config, gate)?),
        ProviderKind::Openai => Box::new(openai::OpenAiProvider::new(config, gate)?),
        ProviderKind::Gemini => Box::new(gemini::GeminiProvider::new(config, gate)?),
        ProviderKind::Anthropic => Box::new(anthropic::AnthropicProvider::new(config, gate)?),
    })
}

/// L2-normalizes a vector in place. A near-zero vector is left as-is
/// rather than producing `NaN`.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

pub(crate) enum Attempt<T> {
    Retryable(MinervaError),
    Fatal(MinervaError),
    Ok(T),
}

/// Retries `attempt` with exponential backoff (1s, 2s, 4s, ... capped)
/// on transient failures, bounded to [`MAX_RETRIES`] extra attempts.
pub(crate) async fn retry_with_backoff<T, F, Fut>(provider: &str, mut attempt: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Attempt<T>>,
{
    let mut last_err = None;
    for n in 0..=MAX_RETRIES {
        match attempt(n).await {
            Attempt::Ok(value) => return Ok(value),
            Attempt::Fatal(err) => return Err(err),
            Attempt::Retryable(err) => {
                if n < MAX_RETRIES {
                    let backoff = Duration::from_secs(1u64 << n.min(4));
                    warn!(provider, attempt = n, backoff_secs = backoff.as_secs(), "retrying after transient provider failure");
                    tokio::time::sleep(backoff).await;
                }
                last_err = Some(err);
            }
        }
    }
    Err(last_err.unwrap())
}

/// Classifies an HTTP response status for retry purposes: 429 and 5xx
/// are transient, everything else is fatal.
pub(crate) fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}
