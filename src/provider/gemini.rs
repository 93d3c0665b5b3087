//! Google Gemini embedding and chat backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::credentials;
use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use crate::provider::ratelimit::RateGate;
use crate::provider::{is_retryable_status, l2_normalize, retry_with_backoff, Attempt, ChatMessage, Provider, ProviderStatus};

pub(crate) const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
const DEFAULT_CHAT_MODEL: &str = "gemini-1.5-flash";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    embedding_model: String,
    chat_model: String,
    api_key_ref: String,
    client: reqwest::Client,
    gate: Option<RateGate>,
}

impl GeminiProvider {
    pub fn new(config: &ProviderConfig, gate: Option<RateGate>) -> Result<Self> {
        let api_key_ref = config.api_key_ref.clone().ok_or_else(|| MinervaError::Config {
            path: "provider.apiKeyRef".to_string(),
            message: "gemini provider requires apiKeyRef".to_string(),
        })?;
        Ok(GeminiProvider {
            embedding_model: config.embedding_model.clone().unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            chat_model: config.llm_model.clone().unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            api_key_ref,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| MinervaError::ProviderError { provider: "gemini".to_string(), message: e.to_string() })?,
            gate,
        })
    }

    async fn api_key(&self) -> Result<String> {
        credentials::resolve(&self.api_key_ref)
    }
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbedValues>,
}

#[derive(Deserialize)]
struct EmbedValues {
    values: Vec<f32>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: String,
}

#[async_trait]
impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = self.api_key().await?;
        let model = self.embedding_model.clone();
        let requests: Vec<String> = texts.to_vec();

        let mut vectors = retry_with_backoff("gemini", |_attempt| {
            let client = self.client.clone();
            let api_key = api_key.clone();
            let model = model.clone();
            let requests = requests.clone();
            async move {
                let _permit = match &self.gate {
                    Some(g) => Some(g.acquire().await),
                    None => None,
                };
                let url = format!("{API_BASE}/models/{model}:batchEmbedContents?key={api_key}");
                let body = json!({
                    "requests": requests.iter().map(|t| json!({
                        "model": format!("models/{model}"),
                        "content": { "parts": [{ "text": t }] },
                    })).collect::<Vec<_>>(),
                });
                let resp = client.post(&url).json(&body).send().await;
                let resp = match resp {
                    Ok(r) => r,
                    Err(e) => return Attempt::Retryable(MinervaError::ProviderError { provider: "gemini".to_string(), message: e.to_string() }),
                };
                let status = resp.status();
                if !status.is_success() {
                    let message = format!("batchEmbedContents failed: {status}");
                    return if is_retryable_status(status) {
                        Attempt::Retryable(MinervaError::ProviderError { provider: "gemini".to_string(), message })
                    } else {
                        Attempt::Fatal(MinervaError::ProviderError { provider: "gemini".to_string(), message })
                    };
                }
                match resp.json::<BatchEmbedResponse>().await {
                    Ok(parsed) => Attempt::Ok(parsed.embeddings.into_iter().map(|e| e.values).collect()),
                    Err(e) => Attempt::Fatal(MinervaError::ProviderError { provider: "gemini".to_string(), message: format!("invalid embed response: {e}") }),
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
        let api_key = self.api_key().await?;
        let url = format!("{API_BASE}/models/{}:generateContent?key={api_key}", self.chat_model);
        let body = json!({
            "generationConfig": { "temperature": temperature },
            "contents": messages.iter().map(|m| json!({
                "role": if m.role == "assistant" { "model" } else { "user" },
                "parts": [{ "text": m.content }],
            })).collect::<Vec<_>>(),
        });

        let _permit = match &self.gate {
            Some(g) => Some(g.acquire().await),
            None => None,
        };

        let resp = self.client.post(&url).json(&body).send().await.map_err(|e| MinervaError::ProviderError {
            provider: "gemini".to_string(),
            message: e.to_string(),
        })?;

        if !resp.status().is_success() {
            return Err(MinervaError::ProviderError { provider: "gemini".to_string(), message: format!("generateContent failed: {}", resp.status()) });
        }

        let parsed: GenerateContentResponse = resp.json().await.map_err(|e| MinervaError::ProviderError {
            provider: "gemini".to_string(),
            message: format!("invalid generateContent response: {e}"),
        })?;

        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| MinervaError::ProviderError { provider: "gemini".to_string(), message: "empty candidates in response".to_string() })
    }

    async fn check(&self) -> ProviderStatus {
        match self.embed(&["probe".to_string()]).await {
            Ok(vectors) => ProviderStatus { available: true, reason: None, dimension: vectors.first().map(|v| v.len()) },
            Err(e) => ProviderStatus { available: false, reason: Some(e.to_string()), dimension: None },
        }
    }
}
