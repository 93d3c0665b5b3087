//! Collection Discovery (C7): at server startup, enumerate collections,
//! reconstruct providers from metadata, and classify each as available
//! or unavailable. Grounded on the teacher's `sources.rs`
//! (`get_sources`/`SourceStatus{name,configured,healthy,notes}`
//! classify pattern), adapted from connectors to collections.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::collection::provider_config_from_metadata;
use crate::credentials;
use crate::errors::MinervaError;
use crate::models::{CollectionMetadata, CollectionSummary};
use crate::provider::{self, Provider};
use crate::store::VectorStore;

/// One entry in the discovery map: a collection's metadata, its
/// reconstructed provider (when construction succeeded), and whether
/// it passed the availability probe.
pub struct DiscoveredCollection {
    pub metadata: CollectionMetadata,
    pub provider: Option<Arc<dyn Provider>>,
    pub available: bool,
    pub reason: Option<String>,
}

/// Immutable after construction: the map built once at server startup.
/// New collections require a restart to appear here.
pub struct Discovery {
    collections: HashMap<String, DiscoveredCollection>,
}

impl Discovery {
    /// Enumerates collections via the store, reconstructs a provider
    /// for each, probes availability, and freezes the result.
    pub async fn build(store: &dyn VectorStore) -> Self {
        let mut collections = HashMap::new();

        let listed = match store.list_collections().await {
            Ok(listed) => listed,
            Err(e) => {
                warn!(error = %e, "failed to list collections at startup");
                return Discovery { collections };
            }
        };

        for (name, metadata) in listed {
            let entry = classify(&name, metadata).await;
            collections.insert(name, entry);
        }

        if collections.values().all(|c| !c.available) && !collections.is_empty() {
            warn!("no collections are available at startup; search calls will report COLLECTION_UNAVAILABLE");
        }

        Discovery { collections }
    }

    pub fn get(&self, name: &str) -> Option<&DiscoveredCollection> {
        self.collections.get(name)
    }

    /// Summaries for every available collection, for `list_knowledge_bases()`.
    pub fn available_summaries(&self, chunk_counts: &HashMap<String, u64>) -> Vec<CollectionSummary> {
        self.collections
            .iter()
            .filter(|(_, c)| c.available)
            .map(|(name, c)| CollectionSummary {
                name: name.clone(),
                description: c.metadata.description.clone(),
                note_count: c.metadata.note_count,
                embedding_model: c.metadata.embedding_model.clone(),
                chunk_count: chunk_counts.get(name).copied().unwrap_or(0),
            })
            .collect()
    }
}

async fn classify(name: &str, metadata: CollectionMetadata) -> DiscoveredCollection {
    if metadata.version != CollectionMetadata::CURRENT_VERSION {
        return DiscoveredCollection {
            metadata,
            provider: None,
            available: false,
            reason: Some("legacy v1 collection".to_string()),
        };
    }

    let provider_config = match provider_config_from_metadata(&metadata) {
        Ok(config) => config,
        Err(_) => {
            return DiscoveredCollection {
                metadata,
                provider: None,
                available: false,
                reason: Some("unknown provider type".to_string()),
            };
        }
    };

    // Checked ahead of `check()` so the canonical "missing env var NAME"
    // reason (spec's enumerated form) reaches the caller instead of
    // `MinervaError::CredentialMissing`'s full remediation-laden Display.
    if let Some(api_key_ref) = &provider_config.api_key_ref {
        if let Err(MinervaError::CredentialMissing { variable }) = credentials::resolve(api_key_ref) {
            return DiscoveredCollection {
                metadata,
                provider: None,
                available: false,
                reason: Some(format!("missing env var {variable}")),
            };
        }
    }

    let built = match provider::build_provider(&provider_config) {
        Ok(p) => p,
        Err(e) => {
            return DiscoveredCollection {
                metadata,
                provider: None,
                available: false,
                reason: Some(e.to_string()),
            };
        }
    };

    let status = built.check().await;
    if !status.available {
        warn!(collection = name, reason = ?status.reason, "collection marked unavailable");
        return DiscoveredCollection {
            metadata,
            provider: None,
            available: false,
            reason: status.reason,
        };
    }

    match status.dimension {
        Some(dim) if dim == metadata.embedding_dimension => DiscoveredCollection {
            metadata,
            provider: Some(Arc::from(built)),
            available: true,
            reason: None,
        },
        Some(dim) => DiscoveredCollection {
            reason: Some(format!("dimension mismatch {} vs {}", dim, metadata.embedding_dimension)),
            metadata,
            provider: None,
            available: false,
        },
        None => DiscoveredCollection {
            metadata,
            provider: None,
            available: false,
            reason: Some("provider did not report a dimension".to_string()),
        },
    }
}
