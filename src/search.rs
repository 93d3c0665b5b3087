//! Search Engine (C8): per-query provider selection, embedding
//! generation, dimension check, ANN query, result shaping, and
//! token-budget self-regulation. Grounded on the teacher's
//! `search_documents` (shared core used by both CLI and server) and
//! `normalize_scores`/token-snippet shaping, adapted to query a single
//! collection's own provider against the Discovery map built at
//! startup instead of a keyword/hybrid FTS5 index.

use std::collections::HashMap;

use serde::Serialize;
use tracing::warn;

use crate::discovery::Discovery;
use crate::errors::{MinervaError, Result};
use crate::models::CollectionSummary;
use crate::store::VectorStore;

pub const MAX_K: usize = 15;
const TOKEN_WARNING_THRESHOLD: usize = 25_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    ChunkOnly,
    Enhanced,
}

impl std::str::FromStr for ContextMode {
    type Err = MinervaError;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chunk_only" => Ok(ContextMode::ChunkOnly),
            "enhanced" => Ok(ContextMode::Enhanced),
            other => Err(MinervaError::Validation {
                field: "context_mode".to_string(),
                message: format!("unknown context mode: {other}"),
            }),
        }
    }
}

/// One shaped search hit, as returned by `search_knowledge_base`.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub note_title: String,
    pub note_id: String,
    pub chunk_index: usize,
    pub modification_date: String,
    pub collection_name: String,
    pub similarity_score: f32,
    pub content: String,
}

/// Looks up `collection_name` in `discovery`, embeds `query` with that
/// collection's own provider, and ANN-queries the store for the `k`
/// nearest chunks, shaping each per `context_mode`.
pub async fn search(
    discovery: &Discovery,
    store: &dyn VectorStore,
    collection_name: &str,
    query: &str,
    k: usize,
    context_mode: ContextMode,
) -> Result<Vec<SearchResult>> {
    let entry = discovery.get(collection_name).ok_or_else(|| MinervaError::CollectionNotFound {
        collection: collection_name.to_string(),
    })?;

    if !entry.available {
        return Err(MinervaError::CollectionUnavailable {
            collection: collection_name.to_string(),
            reason: entry.reason.clone().unwrap_or_else(|| "unknown reason".to_string()),
        });
    }

    let provider = entry.provider.as_ref().ok_or_else(|| MinervaError::CollectionUnavailable {
        collection: collection_name.to_string(),
        reason: "no provider reconstructed for this collection".to_string(),
    })?;

    let k = k.clamp(1, MAX_K);

    let mut embeddings = provider.embed(&[query.to_string()]).await?;
    let embedding = embeddings.pop().ok_or_else(|| MinervaError::ProviderError {
        provider: provider.kind().as_str().to_string(),
        message: "embed returned no vectors for a single query".to_string(),
    })?;

    if embedding.len() != entry.metadata.embedding_dimension {
        return Err(MinervaError::DimensionMismatch {
            expected: entry.metadata.embedding_dimension,
            actual: embedding.len(),
        });
    }

    let matches = store.query(collection_name, &embedding, k).await?;

    // Enhanced mode pulls neighbor chunks from the same result set when
    // present; a note longer than the result set may not have its
    // neighbor returned, in which case content falls back to the
    // matched chunk alone.
    let by_note_and_index: HashMap<(String, usize), String> =
        matches.iter().map(|m| ((m.chunk.note_id.clone(), m.chunk.chunk_index), m.chunk.content.clone())).collect();

    let mut results = Vec::with_capacity(matches.len());
    let mut total_characters = 0usize;

    for m in &matches {
        let content = match context_mode {
            ContextMode::ChunkOnly => m.chunk.content.clone(),
            ContextMode::Enhanced => {
                let mut parts = Vec::new();
                if m.chunk.chunk_index > 0 {
                    if let Some(prev) = by_note_and_index.get(&(m.chunk.note_id.clone(), m.chunk.chunk_index - 1)) {
                        parts.push(prev.clone());
                    }
                }
                parts.push(m.chunk.content.clone());
                if let Some(next) = by_note_and_index.get(&(m.chunk.note_id.clone(), m.chunk.chunk_index + 1)) {
                    parts.push(next.clone());
                }
                parts.join("\n\n")
            }
        };

        total_characters += content.len();

        results.push(SearchResult {
            note_title: m.chunk.title.clone(),
            note_id: m.chunk.note_id.clone(),
            chunk_index: m.chunk.chunk_index,
            modification_date: m.chunk.modification_date.to_rfc3339(),
            collection_name: collection_name.to_string(),
            similarity_score: 1.0 - m.distance,
            content,
        });
    }

    let estimated_tokens = total_characters.div_ceil(4);
    if estimated_tokens > TOKEN_WARNING_THRESHOLD {
        warn!(estimated_tokens, collection = collection_name, "search response exceeds the token warning threshold");
    }

    Ok(results)
}

/// Summaries for every available collection, with chunk counts fetched
/// live from the store (Discovery caches metadata, not chunk counts).
pub async fn list_knowledge_bases(discovery: &Discovery, store: &dyn VectorStore) -> Result<Vec<CollectionSummary>> {
    let mut chunk_counts = HashMap::new();
    for (name, _) in store.list_collections().await? {
        let count = store.chunk_count(&name).await.unwrap_or(0);
        chunk_counts.insert(name, count);
    }
    Ok(discovery.available_summaries(&chunk_counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_mode_parses_known_values() {
        use std::str::FromStr;
        assert_eq!(ContextMode::from_str("chunk_only").unwrap(), ContextMode::ChunkOnly);
        assert_eq!(ContextMode::from_str("enhanced").unwrap(), ContextMode::Enhanced);
        assert!(ContextMode::from_str("bogus").is_err());
    }

    #[test]
    fn k_clamps_into_bounds() {
        assert_eq!(0usize.clamp(1, MAX_K), 1);
        assert_eq!(100usize.clamp(1, MAX_K), MAX_K);
        assert_eq!(5usize.clamp(1, MAX_K), 5);
    }
}
