//! Vector Store Adapter (C4): a thin contract over a persistent ANN
//! engine, plus a concrete `SqliteVectorStore` implementation. Grounded
//! on `crates/context-harness-core/src/store/mod.rs` (the `Store`
//! trait shape) and `crates/context-harness/src/sqlite_store.rs` (the
//! sqlx implementation, `vec_to_blob`/`cosine_similarity` scan).
//!
//! A production deployment would swap this for a real ANN service
//! without changing the [`VectorStore`] trait — the external store is
//! otherwise treated as an abstract key→(embedding, document, metadata)
//! backend per the component design.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::errors::{MinervaError, Result};
use crate::models::{Chunk, CollectionMetadata};

/// Default upsert batch size, per the component design.
pub const DEFAULT_UPSERT_BATCH: usize = 64;

/// A single ANN match, as returned by [`VectorStore::query`].
#[derive(Debug, Clone)]
pub struct QueryMatch {
    pub chunk: Chunk,
    pub distance: f32,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_collection(&self, name: &str, metadata: &CollectionMetadata) -> Result<()>;
    async fn get_collection_metadata(&self, name: &str) -> Result<Option<CollectionMetadata>>;
    async fn delete_collection(&self, name: &str) -> Result<()>;
    async fn list_collections(&self) -> Result<Vec<(String, CollectionMetadata)>>;

    /// Idempotent on chunk id; callers may pass an arbitrarily large
    /// batch, the adapter internally chunks writes.
    async fn upsert(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()>;

    /// Deletes all chunks belonging to the given note ids.
    async fn delete_by_note_ids(&self, collection: &str, note_ids: &[String]) -> Result<()>;

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryMatch>>;

    async fn update_collection_metadata(&self, name: &str, metadata: &CollectionMetadata) -> Result<()>;

    /// `{noteId -> contentHash}` derived from the collection's
    /// first-chunk documents, used by the Indexing Orchestrator to
    /// classify incoming notes as added/updated/unchanged.
    async fn existing_note_hashes(&self, collection: &str) -> Result<HashMap<String, String>>;

    /// Total chunk count for the collection, distinct from its note
    /// count (one note may span many chunks).
    async fn chunk_count(&self, collection: &str) -> Result<u64>;
}

pub struct SqliteVectorStore {
    pool: SqlitePool,
}

impl SqliteVectorStore {
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| MinervaError::Storage {
                message: format!("failed to create directory {}: {e}", parent.display()),
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| MinervaError::Storage { message: format!("failed to open {}: {e}", path.display()) })?;

        let store = SqliteVectorStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                metadata_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                collection TEXT NOT NULL,
                note_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                title TEXT NOT NULL,
                modification_date TEXT NOT NULL,
                size INTEGER NOT NULL,
                header_metadata_json TEXT NOT NULL,
                content_hash TEXT,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_collection ON chunks(collection)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_note ON chunks(collection, note_id)")
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;

        Ok(())
    }
}

fn storage_err(e: sqlx::Error) -> MinervaError {
    MinervaError::Storage { message: e.to_string() }
}

fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

/// Cosine distance on L2-normalized vectors equals `1 - dot(a, b)`.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 2.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn create_collection(&self, name: &str, metadata: &CollectionMetadata) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata).map_err(|e| MinervaError::Storage { message: e.to_string() })?;
        sqlx::query("INSERT INTO collections (name, metadata_json) VALUES (?, ?)")
            .bind(name)
            .bind(metadata_json)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn get_collection_metadata(&self, name: &str) -> Result<Option<CollectionMetadata>> {
        let row = sqlx::query("SELECT metadata_json FROM collections WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_err)?;
        match row {
            None => Ok(None),
            Some(row) => {
                let json: String = row.get("metadata_json");
                let metadata = serde_json::from_str(&json).map_err(|e| MinervaError::Storage { message: e.to_string() })?;
                Ok(Some(metadata))
            }
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        sqlx::query("DELETE FROM chunks WHERE collection = ?").bind(name).execute(&mut *tx).await.map_err(storage_err)?;
        sqlx::query("DELETE FROM collections WHERE name = ?").bind(name).execute(&mut *tx).await.map_err(storage_err)?;
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<(String, CollectionMetadata)>> {
        let rows = sqlx::query("SELECT name, metadata_json FROM collections").fetch_all(&self.pool).await.map_err(storage_err)?;
        rows.into_iter()
            .map(|row| {
                let name: String = row.get("name");
                let json: String = row.get("metadata_json");
                let metadata: CollectionMetadata = serde_json::from_str(&json).map_err(|e| MinervaError::Storage { message: e.to_string() })?;
                Ok((name, metadata))
            })
            .collect()
    }

    async fn upsert(&self, collection: &str, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(MinervaError::Storage { message: "chunk/embedding count mismatch".to_string() });
        }
        debug!(collection, chunks = chunks.len(), "upserting chunks");

        for batch in chunks.iter().zip(embeddings.iter()).collect::<Vec<_>>().chunks(DEFAULT_UPSERT_BATCH) {
            let mut tx = self.pool.begin().await.map_err(storage_err)?;
            for (chunk, embedding) in batch {
                let header_json = serde_json::to_string(&chunk.header_metadata).map_err(|e| MinervaError::Storage { message: e.to_string() })?;
                sqlx::query(
                    "INSERT INTO chunks (id, collection, note_id, chunk_index, content, title, modification_date, size, header_metadata_json, content_hash, embedding)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT(id) DO UPDATE SET
                        content = excluded.content,
                        title = excluded.title,
                        modification_date = excluded.modification_date,
                        size = excluded.size,
                        header_metadata_json = excluded.header_metadata_json,
                        content_hash = excluded.content_hash,
                        embedding = excluded.embedding",
                )
                .bind(&chunk.id)
                .bind(collection)
                .bind(&chunk.note_id)
                .bind(chunk.chunk_index as i64)
                .bind(&chunk.content)
                .bind(&chunk.title)
                .bind(chunk.modification_date.to_rfc3339())
                .bind(chunk.size as i64)
                .bind(header_json)
                .bind(&chunk.content_hash)
                .bind(vec_to_blob(embedding))
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
            }
            tx.commit().await.map_err(storage_err)?;
        }
        Ok(())
    }

    async fn delete_by_note_ids(&self, collection: &str, note_ids: &[String]) -> Result<()> {
        if note_ids.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await.map_err(storage_err)?;
        for note_id in note_ids {
            sqlx::query("DELETE FROM chunks WHERE collection = ? AND note_id = ?")
                .bind(collection)
                .bind(note_id)
                .execute(&mut *tx)
                .await
                .map_err(storage_err)?;
        }
        tx.commit().await.map_err(storage_err)?;
        Ok(())
    }

    async fn query(&self, collection: &str, embedding: &[f32], k: usize) -> Result<Vec<QueryMatch>> {
        let rows = sqlx::query(
            "SELECT id, note_id, chunk_index, content, title, modification_date, size, header_metadata_json, content_hash, embedding
             FROM chunks WHERE collection = ?",
        )
        .bind(collection)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;

        let mut matches: Vec<QueryMatch> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let distance = cosine_distance(embedding, &vector);
                let header_json: String = row.get("header_metadata_json");
                let header_metadata = serde_json::from_str(&header_json).unwrap_or_default();
                let modification_date: String = row.get("modification_date");
                let chunk = Chunk {
                    id: row.get("id"),
                    note_id: row.get("note_id"),
                    chunk_index: row.get::<i64, _>("chunk_index") as usize,
                    content: row.get("content"),
                    title: row.get("title"),
                    modification_date: modification_date.parse().unwrap_or_else(|_| chrono::Utc::now()),
                    size: row.get::<i64, _>("size") as u64,
                    header_metadata,
                    content_hash: row.get("content_hash"),
                };
                QueryMatch { chunk, distance }
            })
            .collect();

        matches.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap_or(std::cmp::Ordering::Equal));
        matches.truncate(k);
        Ok(matches)
    }

    async fn update_collection_metadata(&self, name: &str, metadata: &CollectionMetadata) -> Result<()> {
        let metadata_json = serde_json::to_string(metadata).map_err(|e| MinervaError::Storage { message: e.to_string() })?;
        sqlx::query("UPDATE collections SET metadata_json = ? WHERE name = ?")
            .bind(metadata_json)
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(())
    }

    async fn existing_note_hashes(&self, collection: &str) -> Result<HashMap<String, String>> {
        let rows = sqlx::query("SELECT note_id, content_hash FROM chunks WHERE collection = ? AND content_hash IS NOT NULL")
            .bind(collection)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(rows.into_iter().map(|row| (row.get("note_id"), row.get("content_hash"))).collect())
    }

    async fn chunk_count(&self, collection: &str) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM chunks WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_err)?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn cosine_distance_identical_is_zero() {
        let v = vec![0.6f32, 0.8];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn cosine_distance_orthogonal_is_one() {
        let a = vec![1.0f32, 0.0];
        let b = vec![0.0f32, 1.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn create_get_delete_collection_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::connect(&dir.path().join("test.db")).await.unwrap();
        let provider = crate::models::ProviderConfig {
            provider_type: crate::models::ProviderKind::Ollama,
            embedding_model: Some("mxbai-embed-large".to_string()),
            llm_model: None,
            base_url: None,
            api_key_ref: None,
            rate_limit: None,
        };
        let metadata = CollectionMetadata::new("test collection".to_string(), &provider, "mxbai-embed-large".to_string(), 1024, 1200);
        store.create_collection("notes", &metadata).await.unwrap();
        assert!(store.get_collection_metadata("notes").await.unwrap().is_some());
        assert_eq!(store.list_collections().await.unwrap().len(), 1);
        store.delete_collection("notes").await.unwrap();
        assert!(store.get_collection_metadata("notes").await.unwrap().is_none());
    }
}
