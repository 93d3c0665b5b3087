//! # Minerva
//!
//! A personal knowledge-management retrieval core: chunking, embedding,
//! vector storage, and MCP search over note collections.
//!
//! ## Modules
//!
//! - [`config`] — TOML config loaders for the index, server, and chat surfaces
//! - [`models`] — Core data types: `Note`, `Chunk`, `ProviderConfig`, `CollectionMetadata`
//! - [`chunk`] — Heading-aware markdown chunker
//! - [`credentials`] — `${NAME}` resolution: environment, then OS keychain
//! - [`provider`] — The `Provider` trait and its five backends
//! - [`store`] — The `VectorStore` trait and its SQLite implementation
//! - [`index`] — Full index and incremental update
//! - [`discovery`] — Startup collection enumeration
//! - [`search`] — Per-collection semantic search
//! - [`mcp`] — The MCP tool surface

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use minerva::discovery::Discovery;
use minerva::errors::{MinervaError, Result};
use minerva::search::ContextMode;
use minerva::store::{SqliteVectorStore, VectorStore};
use minerva::{config, credentials, index, mcp, search};

#[derive(Parser)]
#[command(name = "minerva", about = "Minerva — personal knowledge-management retrieval core", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an indexing operation (full or incremental) per a config file
    Index {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        verbose: bool,
    },

    /// Start the MCP server over stdio
    Serve {
        #[arg(long)]
        config: PathBuf,
    },

    /// Start the MCP server over HTTP+SSE
    #[command(name = "serve-http")]
    ServeHttp {
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },

    /// Read-only inspection of a collection's metadata
    Peek {
        collection: String,
        #[arg(long)]
        chromadb: PathBuf,
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Run a single search against a collection, without a server
    Query {
        chromadb: PathBuf,
        query: String,
        #[arg(long)]
        collection: String,
        #[arg(long, default_value_t = 5)]
        max_results: usize,
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Validate a notes JSON file's schema without indexing it
    Validate {
        notes_json: PathBuf,
        #[arg(long)]
        verbose: bool,
    },

    /// Delete a collection (destructive; requires double confirmation)
    Remove { chromadb: PathBuf, collection: String },

    /// Credential administration against the OS keychain
    Keychain {
        #[command(subcommand)]
        action: KeychainAction,
    },
}

#[derive(Subcommand)]
enum KeychainAction {
    Set { name: String },
    Get { name: String },
    List { name: String },
    Delete { name: String },
}

fn db_path(chromadb_path: &std::path::Path) -> PathBuf {
    chromadb_path.join("minerva.db")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Index { config, dry_run, verbose } => run_index(&config, dry_run, verbose).await,
        Commands::Serve { config } => run_serve_stdio(&config).await,
        Commands::ServeHttp { config, host, port } => run_serve_http(&config, host, port).await,
        Commands::Peek { collection, chromadb, format } => run_peek(&collection, &chromadb, &format).await,
        Commands::Query { chromadb, query, collection, max_results, format } => run_query(&chromadb, &query, &collection, max_results, &format).await,
        Commands::Validate { notes_json, verbose } => run_validate(&notes_json, verbose),
        Commands::Remove { chromadb, collection } => run_remove(&chromadb, &collection).await,
        Commands::Keychain { action } => run_keychain(action),
    }
}

async fn run_index(config_path: &std::path::Path, dry_run: bool, verbose: bool) -> Result<()> {
    let config = config::load_index_config(config_path)?;
    let store = SqliteVectorStore::connect(&db_path(&config.chromadb_path)).await?;
    let stats = index::index(&config, &store, dry_run).await?;

    if verbose {
        println!("{}", serde_json::to_string_pretty(&stats).map_err(|e| MinervaError::Other(e.into()))?);
    } else {
        println!("mode={} notes={} chunks={} elapsed_ms={}", stats.mode, stats.notes, stats.chunks, stats.elapsed_ms);
    }
    Ok(())
}

async fn build_discovery(chromadb_path: &std::path::Path) -> Result<(Arc<dyn VectorStore>, Arc<Discovery>)> {
    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::connect(&db_path(chromadb_path)).await?);
    let discovery = Arc::new(Discovery::build(store.as_ref()).await);
    Ok((store, discovery))
}

async fn run_serve_stdio(config_path: &std::path::Path) -> Result<()> {
    use rmcp::ServiceExt;

    let config = config::load_server_config(config_path)?;
    let (store, discovery) = build_discovery(&config.chromadb_path).await?;
    let server = mcp::McpServer::new(discovery, store, config.default_max_results);

    tracing::info!("starting MCP server on stdio");
    let service = server.serve(rmcp::transport::stdio()).await.map_err(|e| MinervaError::Other(anyhow::anyhow!("failed to start MCP stdio service: {e}")))?;
    service.waiting().await.map_err(|e| MinervaError::Other(anyhow::anyhow!("MCP stdio service error: {e}")))?;
    Ok(())
}

async fn run_serve_http(config_path: &std::path::Path, host: Option<String>, port: Option<u16>) -> Result<()> {
    use rmcp::transport::streamable_http_server::{tower::StreamableHttpService, session::local::LocalSessionManager};

    let config = config::load_server_config(config_path)?;
    let (store, discovery) = build_discovery(&config.chromadb_path).await?;
    let default_max_results = config.default_max_results;

    let bind_host = host.unwrap_or(config.host);
    let bind_port = port.unwrap_or(config.port);

    let service = StreamableHttpService::new(
        move || Ok(mcp::McpServer::new(discovery.clone(), store.clone(), default_max_results)),
        LocalSessionManager::default().into(),
        Default::default(),
    );

    let cors = tower_http::cors::CorsLayer::new().allow_origin(tower_http::cors::Any).allow_methods(tower_http::cors::Any).allow_headers(tower_http::cors::Any);

    let app = axum::Router::new().nest_service("/mcp", service).layer(cors);

    let addr = format!("{bind_host}:{bind_port}");
    tracing::info!(addr = %addr, "starting MCP server on HTTP+SSE");
    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| MinervaError::Other(anyhow::anyhow!("failed to bind {addr}: {e}")))?;
    axum::serve(listener, app).await.map_err(|e| MinervaError::Other(anyhow::anyhow!("HTTP server error: {e}")))?;
    Ok(())
}

async fn run_peek(collection: &str, chromadb: &std::path::Path, format: &str) -> Result<()> {
    let store = SqliteVectorStore::connect(&db_path(chromadb)).await?;
    let metadata = store.get_collection_metadata(collection).await?.ok_or_else(|| MinervaError::CollectionNotFound { collection: collection.to_string() })?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&metadata).map_err(|e| MinervaError::Other(e.into()))?),
        _ => {
            println!("collection:          {collection}");
            println!("description:         {}", metadata.description);
            println!("note_count:          {}", metadata.note_count);
            println!("embedding_provider:  {}", metadata.embedding_provider);
            println!("embedding_model:     {}", metadata.embedding_model);
            println!("embedding_dimension: {}", metadata.embedding_dimension);
            println!("chunk_size:          {}", metadata.chunk_size);
            println!("created_at:          {}", metadata.created_at.to_rfc3339());
            println!("last_updated:        {}", metadata.last_updated.to_rfc3339());
        }
    }
    Ok(())
}

async fn run_query(chromadb: &std::path::Path, query: &str, collection: &str, max_results: usize, format: &str) -> Result<()> {
    let store: Arc<dyn VectorStore> = Arc::new(SqliteVectorStore::connect(&db_path(chromadb)).await?);
    let discovery = Discovery::build(store.as_ref()).await;

    let results = search::search(&discovery, store.as_ref(), collection, query, max_results, ContextMode::Enhanced).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&results).map_err(|e| MinervaError::Other(e.into()))?),
        _ => {
            for (i, r) in results.iter().enumerate() {
                println!("{}. [{:.3}] {} (chunk {})", i + 1, r.similarity_score, r.note_title, r.chunk_index);
                println!("   {}", r.content.replace('\n', " "));
            }
            if results.is_empty() {
                println!("No results.");
            }
        }
    }
    Ok(())
}

fn run_validate(notes_json: &std::path::Path, verbose: bool) -> Result<()> {
    let notes = index::load_notes(&notes_json.to_path_buf())?;
    if verbose {
        for note in &notes {
            println!("ok: {} ({} chars)", note.title, note.markdown.len());
        }
    }
    println!("{} notes validated successfully.", notes.len());
    Ok(())
}

async fn run_remove(chromadb: &std::path::Path, collection: &str) -> Result<()> {
    use std::io::Write;

    print!("This permanently deletes collection '{collection}' and all its chunks. Type YES to continue: ");
    std::io::stdout().flush().ok();
    let mut confirm = String::new();
    std::io::stdin().read_line(&mut confirm).ok();
    if confirm.trim() != "YES" {
        println!("Cancelled.");
        return Ok(());
    }

    print!("Type the collection name ('{collection}') to confirm: ");
    std::io::stdout().flush().ok();
    let mut confirm_name = String::new();
    std::io::stdin().read_line(&mut confirm_name).ok();
    if confirm_name.trim() != collection {
        println!("Collection name did not match. Cancelled.");
        return Ok(());
    }

    let store = SqliteVectorStore::connect(&db_path(chromadb)).await?;
    store.delete_collection(collection).await?;
    println!("Collection '{collection}' removed.");
    Ok(())
}

fn run_keychain(action: KeychainAction) -> Result<()> {
    match action {
        KeychainAction::Set { name } => {
            print!("Enter secret for {name}: ");
            use std::io::Write;
            std::io::stdout().flush().ok();
            let mut secret = String::new();
            std::io::stdin().read_line(&mut secret).ok();
            credentials::keychain_set(&name, secret.trim())?;
            println!("Stored {name} in the keychain.");
        }
        KeychainAction::Get { name } => {
            let secret = credentials::keychain_get(&name)?;
            println!("{secret}");
        }
        KeychainAction::List { name } => {
            if credentials::keychain_contains(&name) {
                println!("{name}: present");
            } else {
                println!("{name}: not set");
            }
        }
        KeychainAction::Delete { name } => {
            credentials::keychain_delete(&name)?;
            println!("Deleted {name} from the keychain.");
        }
    }
    Ok(())
}
