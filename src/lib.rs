//! # Minerva
//!
//! **A personal knowledge-management retrieval core.**
//!
//! Minerva indexes a note collection — chunking markdown, embedding the
//! chunks with a configurable AI provider, and storing the result in a
//! local vector store — then serves semantic search over it via a
//! fixed MCP tool surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌────────────┐   ┌───────────┐
//! │ notes.json│──▶│  Indexing  │──▶│  SQLite   │
//! │  (input)  │   │ Chunk+Embed│   │  (vectors)│
//! └───────────┘   └────────────┘   └─────┬─────┘
//!                                         │
//!                   ┌─────────────────────┤
//!                   ▼                     ▼
//!              ┌──────────┐         ┌──────────┐
//!              │   CLI    │         │   MCP    │
//!              │(minerva) │         │ (search) │
//!              └──────────┘         └──────────┘
//! ```
//!
//! ## Data flow
//!
//! 1. **Indexing** ([`index`]) loads a notes JSON file, chunks each note
//!    with [`chunk`], embeds chunks via a [`provider`] backend, and
//!    upserts them through the [`store`] adapter — full the first time,
//!    incremental (added/updated/deleted/unchanged) thereafter.
//! 2. **Discovery** ([`discovery`]) runs once at server startup: it
//!    enumerates collections, reconstructs each one's provider from its
//!    stored [`models::CollectionMetadata`], and probes availability.
//! 3. **Search** ([`search`]) looks a collection up in Discovery's map,
//!    embeds the query with that collection's own provider, ANN-queries
//!    the store, and shapes results (`chunk_only` or `enhanced`).
//! 4. The **MCP tool surface** ([`mcp`]) exposes `list_knowledge_bases`
//!    and `search_knowledge_base` over stdio or HTTP+SSE.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`errors`] | The `MinervaError` taxonomy shared across every public boundary |
//! | [`models`] | Core data types: `Note`, `Chunk`, `ProviderConfig`, `CollectionMetadata` |
//! | [`chunk`] | Heading-aware markdown chunker with separator cascade and overlap |
//! | [`credentials`] | `${NAME}` template resolution: environment, then OS keychain |
//! | [`provider`] | The `Provider` trait, its five backends, retry/backoff, rate limiting |
//! | [`store`] | The `VectorStore` trait and its SQLite-backed implementation |
//! | [`collection`] | Collection-metadata helpers shared by indexing and discovery |
//! | [`index`] | The indexing orchestrator: full index and incremental update |
//! | [`discovery`] | Startup collection enumeration and provider reconstruction |
//! | [`search`] | Per-collection semantic search and knowledge-base listing |
//! | [`mcp`] | The MCP tool surface (`rmcp::ServerHandler`) |
//! | [`config`] | TOML config loaders for the index, server, and chat surfaces |
//!
//! ## Configuration
//!
//! Minerva is configured via TOML files, one per surface (index run,
//! server, chat client). See [`config`] for the three shapes and their
//! validation rules.

pub mod chunk;
pub mod collection;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod errors;
pub mod index;
pub mod mcp;
pub mod models;
pub mod provider;
pub mod search;
pub mod store;
