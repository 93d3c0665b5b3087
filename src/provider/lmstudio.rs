//! LM Studio embedding and chat backend: an OpenAI-compatible HTTP
//! surface against a local `baseUrl`, no API key required.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use crate::provider::ratelimit::RateGate;
use crate::provider::{is_retryable_status, l2_normalize, retry_with_backoff, Attempt, ChatMessage, Provider, ProviderStatus};

const DEFAULT_BASE_URL: &str = "http://localhost:1234";

pub struct LmStudioProvider {
    base_url: String,
    embedding_model: String,
    chat_model: String,
    client: reqwest::Client,
    gate: Option<RateGate>,
}

impl LmStudioProvider {
    pub fn new(config: &ProviderConfig, gate: Option<RateGate>) -> Result<Self> {
        let embedding_model = config.embedding_model.clone().ok_or_else(|| MinervaError::Config {
            path: "provider.embeddingModel".to_string(),
            message: "lmstudio provider requires embeddingModel".to_string(),
        })?;
        Ok(LmStudioProvider {
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            embedding_model,
            chat_model: config.llm_model.clone().unwrap_or_default(),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| MinervaError::ProviderError { provider: "lmstudio".to_string(), message: e.to_string() })?,
            gate,
        })
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
impl Provider for LmStudioProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Lmstudio
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let model = self.embedding_model.clone();
        let input = texts.to_vec();

        let mut vectors = retry_with_backoff("lmstudio", |_attempt| {
            let client = self.client.clone();
            let url = url.clone();
            let model = model.clone();
            let input = input.clone();
            async move {
                let _permit = match &self.gate {
                    Some(g) => Some(g.acquire().await),
                    None => None,
                };
                let resp = client.post(&url).json(&json!({ "model": model, "input": input })).send().await;
                let resp = match resp {
                    Ok(r) => r,
                    Err(e) => return Attempt::Retryable(MinervaError::ProviderError { provider: "lmstudio".to_string(), message: e.to_string() }),
                };
                let status = resp.status();
                if !status.is_success() {
                    let message = format!("embeddings request failed: {status}");
                    return if is_retryable_status(status) {
                        Attempt::Retryable(MinervaError::ProviderError { provider: "lmstudio".to_string(), message })
                    } else {
                        Attempt::Fatal(MinervaError::ProviderError { provider: "lmstudio".to_string(), message })
                    };
                }
                match resp.json::<EmbeddingResponse>().await {
                    Ok(parsed) => Attempt::Ok(parsed.data.into_iter().map(|d| d.embedding).collect()),
                    Err(e) => Attempt::Fatal(MinervaError::ProviderError { provider: "lmstudio".to_string(), message: format!("invalid embeddings response: {e}") }),
                }
            }
        })
        .await?;

        for v in &mut vectors {
            l2_normalize(v);
        }
        Ok(vectors)
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.chat_model,
            "temperature": temperature,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let _permit = match &self.gate {
            Some(g) => Some(g.acquire().await),
            None => None,
        };

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| MinervaError::ProviderError {
            provider: "lmstudio".to_string(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(MinervaError::ProviderError { provider: "lmstudio".to_string(), message: format!("chat request failed: {}", resp.status()) });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| MinervaError::ProviderError {
            provider: "lmstudio".to_string(),
            message: format!("invalid chat response: {e}"),
        })?;
        parsed.choices.into_iter().next().map(|c| c.message.content).ok_or_else(|| MinervaError::ProviderError {
            provider: "lmstudio".to_string(),
            message: "empty choices in chat response".to_string(),
        })
    }

    async fn check(&self) -> ProviderStatus {
        match self.embed(&["probe".to_string()]).await {
            Ok(vectors) => ProviderStatus { available: true, reason: None, dimension: vectors.first().map(|v| v.len()) },
            Err(e) => ProviderStatus { available: false, reason: Some(e.to_string()), dimension: None },
        }
    }
}
