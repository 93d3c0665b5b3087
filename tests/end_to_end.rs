//! End-to-end scenarios exercised directly against library functions and
//! a temp-file-backed `SqliteVectorStore`, in place of spawning the real
//! binary — no AI provider is reachable from this environment, so these
//! tests insert chunks/embeddings through the store directly (as a
//! completed `minerva index` run would leave them) rather than driving
//! the full indexing pipeline end to end.

use std::collections::BTreeMap;

use chrono::Utc;

use minerva::discovery::Discovery;
use minerva::models::{Chunk, CollectionMetadata, Note, ProviderConfig, ProviderKind};
use minerva::search::{self, ContextMode};
use minerva::store::{SqliteVectorStore, VectorStore};

fn provider_config() -> ProviderConfig {
    ProviderConfig {
        provider_type: ProviderKind::Ollama,
        embedding_model: Some("mxbai-embed-large".to_string()),
        llm_model: None,
        base_url: Some("http://127.0.0.1:1".to_string()),
        api_key_ref: None,
        rate_limit: None,
    }
}

fn chunk(note_id: &str, chunk_index: usize, content: &str) -> Chunk {
    Chunk {
        id: Chunk::derive_id(note_id, &Utc::now(), chunk_index),
        note_id: note_id.to_string(),
        chunk_index,
        content: content.to_string(),
        title: "A note".to_string(),
        modification_date: Utc::now(),
        size: content.len() as u64,
        header_metadata: BTreeMap::new(),
        content_hash: if chunk_index == 0 { Some("hash-v1".to_string()) } else { None },
    }
}

fn unit_embedding(dim: usize, hot_index: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dim];
    v[hot_index] = 1.0;
    v
}

async fn store_with_collection(dim: usize) -> (tempfile::TempDir, SqliteVectorStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteVectorStore::connect(&dir.path().join("minerva.db")).await.unwrap();
    let metadata = CollectionMetadata::new("a test knowledge base".to_string(), &provider_config(), "mxbai-embed-large".to_string(), dim, 1200);
    store.create_collection("notes", &metadata).await.unwrap();
    (dir, store)
}

#[tokio::test]
async fn fresh_index_round_trips_through_the_store() {
    let (_dir, store) = store_with_collection(4).await;

    let chunks = vec![chunk("note-1", 0, "first chunk"), chunk("note-1", 1, "second chunk")];
    let embeddings = vec![unit_embedding(4, 0), unit_embedding(4, 1)];
    store.upsert("notes", &chunks, &embeddings).await.unwrap();

    let matches = store.query("notes", &unit_embedding(4, 0), 5).await.unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0].chunk.note_id, "note-1");
    assert!(matches[0].distance < matches[1].distance);
}

#[tokio::test]
async fn incremental_no_op_when_content_hash_is_unchanged() {
    let (_dir, store) = store_with_collection(4).await;
    let chunks = vec![chunk("note-1", 0, "first chunk")];
    store.upsert("notes", &chunks, &[unit_embedding(4, 0)]).await.unwrap();

    let hashes = store.existing_note_hashes("notes").await.unwrap();
    let note = Note {
        title: "A note".to_string(),
        markdown: "irrelevant for this check".to_string(),
        size: 10,
        modification_date: Utc::now(),
        creation_date: None,
        extra: BTreeMap::new(),
    };

    // A note whose stored hash already matches its current content hash
    // is unchanged; the orchestrator would skip re-chunking/re-embedding it.
    assert_eq!(hashes.get("note-1"), Some(&"hash-v1".to_string()));
    assert_ne!(hashes.get("note-1"), Some(&note.content_hash()));
}

#[tokio::test]
async fn content_change_is_detected_via_hash_mismatch() {
    let (_dir, store) = store_with_collection(4).await;
    let chunks = vec![chunk("note-1", 0, "original content")];
    store.upsert("notes", &chunks, &[unit_embedding(4, 0)]).await.unwrap();

    let mut updated = chunks[0].clone();
    updated.content_hash = Some("hash-v2".to_string());
    store.upsert("notes", &[updated], &[unit_embedding(4, 0)]).await.unwrap();

    let hashes = store.existing_note_hashes("notes").await.unwrap();
    assert_eq!(hashes.get("note-1"), Some(&"hash-v2".to_string()));
}

#[tokio::test]
async fn query_against_unreachable_provider_reports_collection_unavailable() {
    let (_dir, store) = store_with_collection(4).await;
    let chunks = vec![chunk("note-1", 0, "first chunk")];
    store.upsert("notes", &chunks, &[unit_embedding(4, 0)]).await.unwrap();

    let discovery = Discovery::build(&store).await;
    let err = search::search(&discovery, &store, "notes", "a query", 5, ContextMode::ChunkOnly).await.unwrap_err();
    assert_eq!(err.code(), "COLLECTION_UNAVAILABLE");
}

#[tokio::test]
async fn query_against_unknown_collection_reports_not_found() {
    let (_dir, store) = store_with_collection(4).await;
    let discovery = Discovery::build(&store).await;
    let err = search::search(&discovery, &store, "does-not-exist", "a query", 5, ContextMode::ChunkOnly).await.unwrap_err();
    assert_eq!(err.code(), "COLLECTION_NOT_FOUND");
}

#[tokio::test]
async fn list_knowledge_bases_omits_unavailable_collections() {
    let (_dir, store) = store_with_collection(4).await;
    let chunks = vec![chunk("note-1", 0, "first chunk")];
    store.upsert("notes", &chunks, &[unit_embedding(4, 0)]).await.unwrap();

    let discovery = Discovery::build(&store).await;
    let summaries = search::list_knowledge_bases(&discovery, &store).await.unwrap();

    // The reconstructed provider points at an unreachable address, so
    // the collection never passes Discovery's availability probe and
    // must not appear in the listing.
    assert!(summaries.is_empty());
}
