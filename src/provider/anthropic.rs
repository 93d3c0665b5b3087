//! Anthropic chat backend. Anthropic exposes no embedding endpoint, so
//! [`Provider::embed`] falls through to the default "unsupported"
//! implementation; selecting Anthropic for an indexing config fails at
//! index time per the component design's "fails at index time" rule.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::credentials;
use crate::errors::{MinervaError, Result};
use crate::models::{ProviderConfig, ProviderKind};
use crate::provider::ratelimit::RateGate;
use crate::provider::{ChatMessage, Provider, ProviderStatus};

const DEFAULT_CHAT_MODEL: &str = "claude-3-5-sonnet-20241022";
const API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    chat_model: String,
    api_key_ref: String,
    client: reqwest::Client,
    gate: Option<RateGate>,
}

impl AnthropicProvider {
    pub fn new(config: &ProviderConfig, gate: Option<RateGate>) -> Result<Self> {
        let api_key_ref = config.api_key_ref.clone().ok_or_else(|| MinervaError::Config {
            path: "provider.apiKeyRef".to_string(),
            message: "anthropic provider requires apiKeyRef".to_string(),
        })?;
        Ok(AnthropicProvider {
            chat_model: config.llm_model.clone().unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            api_key_ref,
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(30))
                .build()
                .map_err(|e| MinervaError::ProviderError { provider: "anthropic".to_string(), message: e.to_string() })?,
            gate,
        })
    }
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, messages: &[ChatMessage], temperature: f32) -> Result<String> {
        let api_key = credentials::resolve(&self.api_key_ref)?;
        let body = json!({
            "model": self.chat_model,
            "max_tokens": 1024,
            "temperature": temperature,
            "messages": messages.iter().map(|m| json!({"role": m.role, "content": m.content})).collect::<Vec<_>>(),
        });

        let _permit = match &self.gate {
            Some(g) => Some(g.acquire().await),
            None => None,
        };

        let resp = self
            .client
            .post(API_URL)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| MinervaError::ProviderError { provider: "anthropic".to_string(), message: e.to_string() })?;

        if !resp.status().is_success() {
            return Err(MinervaError::ProviderError { provider: "anthropic".to_string(), message: format!("messages request failed: {}", resp.status()) });
        }

        let parsed: MessagesResponse = resp.json().await.map_err(|e| MinervaError::ProviderError {
            provider: "anthropic".to_string(),
            message: format!("invalid messages response: {e}"),
        })?;

        parsed.content.into_iter().next().map(|b| b.text).ok_or_else(|| MinervaError::ProviderError {
            provider: "anthropic".to_string(),
            message: "empty content in messages response".to_string(),
        })
    }

    async fn check(&self) -> ProviderStatus {
        match self.complete(&[ChatMessage { role: "user".to_string(), content: "probe".to_string() }], 0.0).await {
            Ok(_) => ProviderStatus { available: true, reason: None, dimension: None },
            Err(e) => ProviderStatus { available: false, reason: Some(e.to_string()), dimension: None },
        }
    }
}
