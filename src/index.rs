//! Indexing Orchestrator (C6): full index and incremental update, with
//! change detection, dimension probing, and config-compatibility
//! gating. Grounded on the teacher's `ingest.rs` (transactional
//! delete-then-insert on update) and `embed_cmd.rs` (batched embedding
//! loop), generalized to the full/incremental decision tree below.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::collection::{incompatible_fields, provider_config_from_metadata};
use crate::errors::{MinervaError, Result};
use crate::models::{CollectionMetadata, Note, ProviderConfig};
use crate::provider::{self, ChatMessage};
use crate::store::VectorStore;
use crate::chunk;

/// Embedding batch size for full and incremental indexing runs.
const EMBED_BATCH: usize = 64;
const DEFAULT_CHUNK_SIZE: usize = 1200;

#[derive(Debug, Clone, Deserialize)]
pub struct CollectionSpec {
    pub name: String,
    pub description: String,
    pub json_file: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub force_recreate: bool,
    #[serde(default)]
    pub skip_ai_validation: bool,
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexConfig {
    pub chromadb_path: PathBuf,
    pub collection: CollectionSpec,
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub mode: String,
    pub notes: usize,
    pub chunks: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unchanged: Option<usize>,
    pub elapsed_ms: u128,
}

/// Loads a notes JSON file and validates the schema (§3 invariants).
/// Validation errors are field-precise.
pub fn load_notes(path: &PathBuf) -> Result<Vec<Note>> {
    let raw = std::fs::read_to_string(path).map_err(|e| MinervaError::Validation {
        field: "json_file".to_string(),
        message: format!("cannot read {}: {e}", path.display()),
    })?;
    let notes: Vec<Note> = serde_json::from_str(&raw).map_err(|e| MinervaError::Validation {
        field: "json_file".to_string(),
        message: format!("malformed notes JSON: {e}"),
    })?;
    for (i, note) in notes.iter().enumerate() {
        if note.title.trim().is_empty() {
            return Err(MinervaError::Validation {
                field: format!("notes[{i}].title"),
                message: "title must not be empty".to_string(),
            });
        }
    }
    Ok(notes)
}

/// Runs the full indexing operation described by `config` against
/// `store`. Returns summary stats for the CLI/MCP surface.
pub async fn index(config: &IndexConfig, store: &dyn VectorStore, dry_run: bool) -> Result<IndexStats> {
    let started = Instant::now();
    let notes = load_notes(&config.collection.json_file)?;

    let provider = provider::build_provider(&config.provider)?;
    let status = provider.check().await;
    if !status.available {
        return Err(MinervaError::ProviderUnavailable {
            provider: config.provider.provider_type.as_str().to_string(),
            reason: status.reason.unwrap_or_else(|| "unknown reason".to_string()),
        });
    }
    let dimension = status.dimension.ok_or_else(|| MinervaError::ProviderError {
        provider: config.provider.provider_type.as_str().to_string(),
        message: "dimension probe did not report a vector length".to_string(),
    })?;

    if !config.collection.skip_ai_validation {
        validate_description(&*provider, &config.collection.description).await;
    }

    let existing = store.get_collection_metadata(&config.collection.name).await?;

    let plan = match existing {
        None => Plan::Full,
        Some(_) if config.collection.force_recreate => {
            if !dry_run {
                store.delete_collection(&config.collection.name).await?;
            }
            Plan::Full
        }
        Some(meta) => {
            if meta.version != CollectionMetadata::CURRENT_VERSION {
                return Err(MinervaError::IncompatibleCollection {
                    collection: config.collection.name.clone(),
                    field: "version".to_string(),
                });
            }
            let incoming_model = config
                .provider
                .embedding_model
                .clone()
                .unwrap_or_else(|| provider::default_embedding_model(config.provider.provider_type).to_string());
            let mismatches = incompatible_fields(&meta, &config.provider, &incoming_model, config.collection.chunk_size);
            if let Some(field) = mismatches.first() {
                return Err(MinervaError::IncompatibleCollection {
                    collection: config.collection.name.clone(),
                    field: field.to_string(),
                });
            }
            Plan::Incremental(meta)
        }
    };

    let stats = match plan {
        Plan::Full => full_index(config, &*provider, store, dimension, &notes, dry_run).await?,
        Plan::Incremental(meta) => incremental_update(config, &*provider, store, &meta, &notes, dry_run).await?,
    };

    info!(mode = %stats.mode, notes = stats.notes, chunks = stats.chunks, "indexing run complete");
    Ok(IndexStats { elapsed_ms: started.elapsed().as_millis(), ..stats })
}

enum Plan {
    Full,
    Incremental(CollectionMetadata),
}

async fn validate_description(provider: &dyn provider::Provider, description: &str) {
    let prompt = format!(
        "Score how clearly this knowledge-base description tells an AI agent when to consult it, from 0 to 10. Reply with only the number.\n\n{description}"
    );
    match provider.complete(&[ChatMessage { role: "user".to_string(), content: prompt }], 0.0).await {
        Ok(reply) => {
            let score: Option<u32> = reply.trim().chars().take_while(|c| c.is_ascii_digit()).collect::<String>().parse().ok();
            if let Some(score) = score {
                if score < 7 {
                    warn!(score, "collection description scored below the recommended threshold");
                }
            }
        }
        Err(e) => warn!(error = %e, "skipping description validation: provider does not support chat completion"),
    }
}

async fn embed_all(provider: &dyn provider::Provider, texts: &[String]) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for batch in texts.chunks(EMBED_BATCH) {
        out.extend(provider.embed(batch).await?);
    }
    Ok(out)
}

async fn full_index(
    config: &IndexConfig,
    provider: &dyn provider::Provider,
    store: &dyn VectorStore,
    dimension: usize,
    notes: &[Note],
    dry_run: bool,
) -> Result<IndexStats> {
    let mut all_chunks = Vec::new();
    for note in notes {
        all_chunks.extend(chunk::chunk_note(note, config.collection.chunk_size));
    }

    if dry_run {
        return Ok(IndexStats {
            mode: "full".to_string(),
            notes: notes.len(),
            chunks: all_chunks.len(),
            added: None,
            updated: None,
            deleted: None,
            unchanged: None,
            elapsed_ms: 0,
        });
    }

    let texts: Vec<String> = all_chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embed_all(provider, &texts).await?;

    let mut metadata = CollectionMetadata::new(
        config.collection.description.clone(),
        &config.provider,
        provider.model_name().to_string(),
        dimension,
        config.collection.chunk_size,
    );
    metadata.note_count = notes.len() as u64;

    store.create_collection(&config.collection.name, &metadata).await?;
    store.upsert(&config.collection.name, &all_chunks, &embeddings).await?;

    Ok(IndexStats {
        mode: "full".to_string(),
        notes: notes.len(),
        chunks: all_chunks.len(),
        added: None,
        updated: None,
        deleted: None,
        unchanged: None,
        elapsed_ms: 0,
    })
}

async fn incremental_update(
    config: &IndexConfig,
    provider: &dyn provider::Provider,
    store: &dyn VectorStore,
    existing: &CollectionMetadata,
    notes: &[Note],
    dry_run: bool,
) -> Result<IndexStats> {
    let existing_hashes = store.existing_note_hashes(&config.collection.name).await?;

    let mut added = Vec::new();
    let mut updated = Vec::new();
    let mut unchanged = 0usize;
    let mut incoming_ids = std::collections::HashSet::new();

    for note in notes {
        let note_id = note.note_id();
        incoming_ids.insert(note_id.clone());
        match existing_hashes.get(&note_id) {
            None => added.push(note.clone()),
            Some(hash) if *hash != note.content_hash() => updated.push(note.clone()),
            Some(_) => unchanged += 1,
        }
    }

    let deleted_note_ids: Vec<String> = existing_hashes.keys().filter(|id| !incoming_ids.contains(*id)).cloned().collect();

    if dry_run {
        return Ok(IndexStats {
            mode: "incremental".to_string(),
            notes: notes.len(),
            chunks: 0,
            added: Some(added.len()),
            updated: Some(updated.len()),
            deleted: Some(deleted_note_ids.len()),
            unchanged: Some(unchanged),
            elapsed_ms: 0,
        });
    }

    let mut to_delete = deleted_note_ids.clone();
    to_delete.extend(updated.iter().map(|n| n.note_id()));
    store.delete_by_note_ids(&config.collection.name, &to_delete).await?;

    let mut new_chunks = Vec::new();
    for note in added.iter().chain(updated.iter()) {
        new_chunks.extend(chunk::chunk_note(note, config.collection.chunk_size));
    }

    let chunk_count = new_chunks.len();
    if !new_chunks.is_empty() {
        let texts: Vec<String> = new_chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = embed_all(provider, &texts).await?;
        store.upsert(&config.collection.name, &new_chunks, &embeddings).await?;
    }

    let mut metadata = existing.clone();
    metadata.last_updated = chrono::Utc::now();
    metadata.description = config.collection.description.clone();
    metadata.note_count = (metadata.note_count as i64 - deleted_note_ids.len() as i64 + added.len() as i64).max(0) as u64;
    store.update_collection_metadata(&config.collection.name, &metadata).await?;

    Ok(IndexStats {
        mode: "incremental".to_string(),
        notes: notes.len(),
        chunks: chunk_count,
        added: Some(added.len()),
        updated: Some(updated.len()),
        deleted: Some(deleted_note_ids.len()),
        unchanged: Some(unchanged),
        elapsed_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_notes_rejects_empty_title() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, r#"[{"title":"","markdown":"x","size":1,"modificationDate":"2025-01-01T00:00:00Z"}]"#).unwrap();
        let err = load_notes(&path).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn load_notes_accepts_valid_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");
        std::fs::write(&path, r#"[{"title":"A","markdown":"x","size":1,"modificationDate":"2025-01-01T00:00:00Z"}]"#).unwrap();
        let notes = load_notes(&path).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "A");
    }

}
