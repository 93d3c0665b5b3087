//! Ollama embedding and chat backend: HTTP client against a local
//! `baseUrl`, no API key required.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use crate::provider::ratelimit::RateGate;
use crate::provider::{is_retryable_status, l2_normalize, retry_with_backoff, Attempt, ChatMessage, Provider, ProviderStatus};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub(crate) const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
const DEFAULT_CHAT_MODEL: &str = "llama3.1";

pub struct OllamaProvider {
    base_url: String,
    embedding_model: String,
    chat_model: String,
    client: reqwest::Client,
    gate: Option<RateGate>,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig, gate: Option<RateGate>) -> Result<Self> {
        Ok(OllamaProvider {
            base_url: config.base_url.clone().unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            embedding_model: config.embedding_model.clone().unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: config.llm_model.clone().unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| MinervaError::ProviderError { provider: "ollama".to_string(), message: e.to_string() })?,
            gate,
        })
    }
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[async_trait]
impl Provider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/api/embed", self.base_url.trim_end_matches('/'));
        let model = self.embedding_model.clone();
        let input = texts.to_vec();

        let mut vectors = retry_with_backoff("ollama", |_attempt| {
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
                    Err(e) => return Attempt::Retryable(MinervaError::ProviderError { provider: "ollama".to_string(), message: e.to_string() }),
                };
                let status = resp.status();
                if !status.is_success() {
                    let message = format!("embed request failed: {status}");
                    return if is_retryable_status(status) {
                        Attempt::Retryable(MinervaError::ProviderError { provider: "ollama".to_string(), message })
                    } else {
                        Attempt::Fatal(MinervaError::ProviderError { provider: "ollama".to_string(), message })
                    };
                }
                match resp.json::<EmbedResponse>().await {
                    Ok(parsed) => Attempt::Ok(parsed.embeddings),
                    Err(e) => Attempt::Fatal(MinervaError::ProviderError { provider: "ollama".to_string(), message: format!("invalid embed response: {e}") }),
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
        let url = format!("{}/api/chat", self.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.chat_model,
            "stream": false,
            "options": { "temperature": temperature },
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let _permit = match &self.gate {
            Some(g) => Some(g.acquire().await),
            None => None,
        };

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| MinervaError::ProviderError {
            provider: "ollama".to_string(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(MinervaError::ProviderError { provider: "ollama".to_string(), message: format!("chat request failed: {}", resp.status()) });
        }

        let parsed: ChatResponse = resp.json().await.map_err(|e| MinervaError::ProviderError {
            provider: "ollama".to_string(),
            message: format!("invalid chat response: {e}"),
        })?;
        Ok(parsed.message.content)
    }

    async fn check(&self) -> ProviderStatus {
        match self.embed(&["probe".to_string()]).await {
            Ok(vectors) => ProviderStatus { available: true, reason: None, dimension: vectors.first().map(|v| v.len()) },
            Err(e) => ProviderStatus { available: false, reason: Some(e.to_string()), dimension: None },
        }
    }
}
