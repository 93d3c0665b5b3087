//! Collection Metadata (C5): reconstructing a [`ProviderConfig`] from a
//! stored [`CollectionMetadata`], and comparing an incoming config
//! against what a collection already speaks.
//!
//! The metadata struct itself lives in `models.rs`; this module holds
//! the read-side logic that Discovery and the Orchestrator share.

use std::str::FromStr;

use crate::errors::{MinervaError, Result};
use crate::models::{CollectionMetadata, ProviderConfig, ProviderKind};

/// Reconstructs a `ProviderConfig` from stored metadata. Only the
/// `${NAME}` reference is copied into `apiKeyRef`, never a resolved
/// secret — actual resolution happens at call time via the Credential
/// Store.
pub fn provider_config_from_metadata(metadata: &CollectionMetadata) -> Result<ProviderConfig> {
    let provider_type = ProviderKind::from_str(&metadata.embedding_provider).map_err(|_| MinervaError::CollectionUnavailable {
        collection: String::new(),
        reason: format!("unknown provider type: {}", metadata.embedding_provider),
    })?;

    Ok(ProviderConfig {
        provider_type,
        embedding_model: Some(metadata.embedding_model.clone()),
        llm_model: metadata.llm_model.clone(),
        base_url: metadata.embedding_base_url.clone(),
        api_key_ref: metadata.embedding_api_key_ref.clone(),
        rate_limit: None,
    })
}

/// Fields that make an existing collection's embedding incompatible
/// with an incoming index config. Any mismatch requires
/// `force_recreate: true`.
pub fn incompatible_fields(existing: &CollectionMetadata, incoming_provider: &ProviderConfig, incoming_model: &str, incoming_chunk_size: usize) -> Vec<&'static str> {
    let mut mismatches = Vec::new();
    if existing.embedding_provider != incoming_provider.provider_type.as_str() {
        mismatches.push("embedding_provider");
    }
    if existing.embedding_model != incoming_model {
        mismatches.push("embedding_model");
    }
    if existing.chunk_size != incoming_chunk_size {
        mismatches.push("chunk_size");
    }
    mismatches
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metadata() -> CollectionMetadata {
        CollectionMetadata {
            version: "2.0".to_string(),
            description: "d".to_string(),
            note_count: 1,
            created_at: Utc::now(),
            last_updated: Utc::now(),
            note_hash_algorithm: "sha256".to_string(),
            embedding_provider: "openai".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimension: 1536,
            embedding_base_url: None,
            embedding_api_key_ref: Some("${OPENAI_API_KEY}".to_string()),
            llm_model: None,
            chunk_size: 1200,
        }
    }

    #[test]
    fn reconstructs_provider_config_with_reference_not_secret() {
        let meta = metadata();
        let config = provider_config_from_metadata(&meta).unwrap();
        assert_eq!(config.api_key_ref.as_deref(), Some("${OPENAI_API_KEY}"));
    }

    #[test]
    fn detects_model_mismatch() {
        let meta = metadata();
        let incoming = provider_config_from_metadata(&meta).unwrap();
        let mismatches = incompatible_fields(&meta, &incoming, "text-embedding-3-large", 1200);
        assert_eq!(mismatches, vec!["embedding_model"]);
    }

    #[test]
    fn no_mismatch_when_identical() {
        let meta = metadata();
        let incoming = provider_config_from_metadata(&meta).unwrap();
        let mismatches = incompatible_fields(&meta, &incoming, &meta.embedding_model, meta.chunk_size);
        assert!(mismatches.is_empty());
    }
}
