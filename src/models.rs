//! Core data types: [`Note`] (external input), [`Chunk`] (the unit of
//! embedding and retrieval), [`CollectionMetadata`], and [`ProviderConfig`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// The externally-supplied unit of content. Extractors (out of scope
/// here) normalize heterogeneous sources down to this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub title: String,
    #[serde(default)]
    pub markdown: String,
    pub size: u64,
    #[serde(rename = "modificationDate")]
    pub modification_date: DateTime<Utc>,
    #[serde(rename = "creationDate", default)]
    pub creation_date: Option<DateTime<Utc>>,
    /// Arbitrary extra fields preserved but not required by the core.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Note {
    /// Stable identifier: SHA-1 of `title | creationDate`, hex-encoded.
    /// SHA-1 is used solely as a compact stable key, not for security.
    pub fn note_id(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"|");
        if let Some(created) = &self.creation_date {
            hasher.update(created.to_rfc3339().as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// SHA-256 over `title + "\n" + markdown`, used to detect content
    /// changes between indexing runs cheaply.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.title.as_bytes());
        hasher.update(b"\n");
        hasher.update(self.markdown.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// A bounded slice of one note: the unit of embedding and retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    #[serde(rename = "noteId")]
    pub note_id: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: usize,
    pub content: String,
    pub title: String,
    #[serde(rename = "modificationDate")]
    pub modification_date: DateTime<Utc>,
    pub size: u64,
    /// Heading levels encountered above this chunk, e.g. `{"h1": "Intro"}`.
    #[serde(rename = "headerMetadata", default)]
    pub header_metadata: BTreeMap<String, String>,
    /// Only set on the first chunk of each note.
    #[serde(rename = "contentHash", default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

impl Chunk {
    /// `id = SHA256(noteId | modificationDate | chunkIndex)`, hex-encoded.
    pub fn derive_id(note_id: &str, modification_date: &DateTime<Utc>, chunk_index: usize) -> String {
        let mut hasher = Sha256::new();
        hasher.update(note_id.as_bytes());
        hasher.update(b"|");
        hasher.update(modification_date.to_rfc3339().as_bytes());
        hasher.update(b"|");
        hasher.update(chunk_index.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// `providerType ∈ {ollama, lmstudio, openai, gemini, anthropic}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Ollama,
    Lmstudio,
    Openai,
    Gemini,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "ollama",
            ProviderKind::Lmstudio => "lmstudio",
            ProviderKind::Openai => "openai",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ollama" => Ok(ProviderKind::Ollama),
            "lmstudio" => Ok(ProviderKind::Lmstudio),
            "openai" => Ok(ProviderKind::Openai),
            "gemini" => Ok(ProviderKind::Gemini),
            "anthropic" => Ok(ProviderKind::Anthropic),
            other => anyhow::bail!("unknown provider type: {other}"),
        }
    }
}

/// Optional cooperative rate-limit gate configuration for a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(rename = "requestsPerMinute")]
    pub requests_per_minute: u32,
    pub concurrency: u32,
}

/// In-memory description of one AI backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(rename = "providerType")]
    pub provider_type: ProviderKind,
    #[serde(rename = "embeddingModel")]
    pub embedding_model: Option<String>,
    #[serde(rename = "llmModel", default)]
    pub llm_model: Option<String>,
    #[serde(rename = "baseUrl", default)]
    pub base_url: Option<String>,
    /// A `${NAME}` template, or a literal secret never persisted to storage.
    #[serde(rename = "apiKeyRef", default)]
    pub api_key_ref: Option<String>,
    #[serde(rename = "rateLimit", default)]
    pub rate_limit: Option<RateLimitConfig>,
}

/// A named container of chunks plus bookkeeping metadata, persisted by
/// the vector store adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMetadata {
    pub version: String,
    pub description: String,
    pub note_count: u64,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub note_hash_algorithm: String,
    pub embedding_provider: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    #[serde(default)]
    pub embedding_base_url: Option<String>,
    #[serde(default)]
    pub embedding_api_key_ref: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
    pub chunk_size: usize,
}

impl CollectionMetadata {
    pub const CURRENT_VERSION: &'static str = "2.0";

    pub fn new(
        description: String,
        provider: &ProviderConfig,
        embedding_model: String,
        embedding_dimension: usize,
        chunk_size: usize,
    ) -> Self {
        let now = Utc::now();
        CollectionMetadata {
            version: Self::CURRENT_VERSION.to_string(),
            description,
            note_count: 0,
            created_at: now,
            last_updated: now,
            note_hash_algorithm: "sha256".to_string(),
            embedding_provider: provider.provider_type.as_str().to_string(),
            embedding_model,
            embedding_dimension,
            embedding_base_url: provider.base_url.clone(),
            embedding_api_key_ref: provider.api_key_ref.clone(),
            llm_model: provider.llm_model.clone(),
            chunk_size,
        }
    }
}

/// Summary returned by `list_knowledge_bases()` for each available
/// collection.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub description: String,
    pub note_count: u64,
    pub embedding_model: String,
    pub chunk_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(title: &str, markdown: &str) -> Note {
        Note {
            title: title.to_string(),
            markdown: markdown.to_string(),
            size: markdown.len() as u64,
            modification_date: "2025-01-01T00:00:00Z".parse().unwrap(),
            creation_date: Some("2024-12-01T00:00:00Z".parse().unwrap()),
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn note_id_is_deterministic() {
        let a = note("A", "text");
        let b = note("A", "different text");
        assert_eq!(a.note_id(), b.note_id());
    }

    #[test]
    fn note_id_changes_with_title() {
        let a = note("A", "text");
        let b = note("B", "text");
        assert_ne!(a.note_id(), b.note_id());
    }

    #[test]
    fn content_hash_changes_with_markdown() {
        let a = note("A", "text");
        let b = note("A", "other text");
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn chunk_id_deterministic() {
        let ts: DateTime<Utc> = "2025-01-01T00:00:00Z".parse().unwrap();
        let id1 = Chunk::derive_id("note1", &ts, 0);
        let id2 = Chunk::derive_id("note1", &ts, 0);
        assert_eq!(id1, id2);
        let id3 = Chunk::derive_id("note1", &ts, 1);
        assert_ne!(id1, id3);
    }

    #[test]
    fn provider_kind_round_trips_through_str() {
        use std::str::FromStr;
        for kind in ["ollama", "lmstudio", "openai", "gemini", "anthropic"] {
            let parsed = ProviderKind::from_str(kind).unwrap();
            assert_eq!(parsed.as_str(), kind);
        }
    }
}
