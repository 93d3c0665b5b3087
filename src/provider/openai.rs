//! OpenAI embedding and chat backend. Grounded on the teacher's
//! `OpenAIProvider` (HTTP client with timeout, retry loop on 429/5xx).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use crate::credentials;
use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use crate::provider::ratelimit::RateGate;
use crate::provider::{is_retryable_status, l2_normalize, retry_with_backoff, Attempt, ChatMessage, Provider, ProviderStatus};

pub(crate) const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const BATCH_SIZE: usize = 100;

pub struct OpenAiProvider {
    embedding_model: String,
    chat_model: String,
    api_key_ref: String,
    client: reqwest::Client,
    gate: Option<RateGate>,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig, gate: Option<RateGate>) -> Result<Self> {
        let api_key_ref = config.api_key_ref.clone().ok_or_else(|| MinervaError::Config {
            path: "provider.apiKeyRef".to_string(),
            message: "openai provider requires apiKeyRef".to_string(),
        })?;
        Ok(OpenAiProvider {
            embedding_model: config.embedding_model.clone().unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: config.llm_model.clone().unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            api_key_ref,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| MinervaError::ProviderError {
                    provider: "openai".to_string(),
                    message: e.to_string(),
                })?,
            gate,
        })
    }

    async fn api_key(&self) -> Result<String> {
        credentials::resolve(&self.api_key_ref)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Openai
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    #[instrument(skip(self, texts), fields(provider = "openai", count = texts.len()))]
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(BATCH_SIZE) {
            let mut vectors = self.embed_batch(batch).await?;
            for v in &mut vectors {
                l2_normalize(v);
            }
            out.extend(vectors);
        }
        Ok(out)
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let api_key = self.api_key().await?;
        let body = json!({
            "model": self.chat_model,
            "temperature": temperature,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let _permit = match &self.gate {
            Some(g) => Some(g.acquire().await),
            None => None,
        };

        let resp = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MinervaError::ProviderError {
                provider: "openai".to_string(),
                message: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(MinervaError::ProviderError {
                provider: "openai".to_string(),
                message: format!("chat completion failed: {}", resp.status()),
            });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| MinervaError::ProviderError {
            provider: "openai".to_string(),
            message: format!("invalid chat response: {e}"),
        })?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| MinervaError::ProviderError {
                provider: "openai".to_string(),
                message: "empty choices in chat response".to_string(),
            })
    }

    async fn check(&self) -> ProviderStatus {
        match self.embed(&["probe".to_string()]).await {
            Ok(vectors) => ProviderStatus {
                available: true,
                reason: None,
                dimension: vectors.first().map(|v| v.len()),
            },
            Err(e) => ProviderStatus {
                available: false,
                reason: Some(e.to_string()),
                dimension: None,
            },
        }
    }
}

impl OpenAiProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self.api_key().await?;
        let model = self.embedding_model.clone();

        retry_with_backoff("openai", |_attempt| {
            let client = self.client.clone();
            let api_key = api_key.clone();
            let model = model.clone();
            let texts = texts.to_vec();
            async move {
                let _permit = match &self.gate {
                    Some(g) => Some(g.acquire().await),
                    None => None,
                };
                let body = json!({ "model": model, "input": texts });
                let resp = client
                    .post("https://api.openai.com/v1/embeddings")
                    .bearer_auth(api_key)
                    .json(&body)
                    .send()
                    .await;

                let resp = match resp {
                    Ok(r) => r,
                    Err(e) => {
                        return Attempt::Retryable(MinervaError::ProviderError {
                            provider: "openai".to_string(),
                            message: e.to_string(),
                        })
                    }
                };

                let status = resp.status();
                if !status.is_success() {
                    let message = format!("embeddings request failed: {status}");
                    return if is_retryable_status(status) {
                        Attempt::Retryable(MinervaError::ProviderError { provider: "openai".to_string(), message })
                    } else {
                        Attempt::Fatal(MinervaError::ProviderError { provider: "openai".to_string(), message })
                    };
                }

                match resp.json::<EmbeddingResponse>().await {
                    Ok(parsed) => Attempt::Ok(parsed.data.into_iter().map(|d| d.embedding).collect()),
                    Err(e) => Attempt::Fatal(MinervaError::ProviderError {
                        provider: "openai".to_string(),
                        message: format!("invalid embeddings response: {e}"),
                    }),
                }
            }
        })
        .await
    }
}
