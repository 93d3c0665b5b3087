//! Config Loaders (C10): three config shapes — index, server, and chat
//! — each loaded by an idempotent function that returns a
//! fully-resolved, absolute-path data object or a field-path-qualified
//! [`MinervaError::Config`]. Grounded on the teacher's `load_config`
//! (read-parse-validate pipeline over a TOML file), generalized to
//! three separate shapes instead of one monolithic `Config`.
//!
//! Relative paths resolve against the config file's own directory.
//! `${NAME}` references inside `provider` blocks are left unresolved —
//! they travel through to the Credential Store at call time.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{MinervaError, Result};
use crate::index::{CollectionSpec, IndexConfig};
use crate::models::ProviderConfig;

fn read_and_parse<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| MinervaError::Config {
        path: path.display().to_string(),
        message: format!("cannot read config file: {e}"),
    })?;
    toml::from_str(&content).map_err(|e| MinervaError::Config {
        path: path.display().to_string(),
        message: format!("malformed TOML: {e}"),
    })
}

fn resolve_relative(base_dir: &Path, candidate: PathBuf) -> PathBuf {
    if candidate.is_absolute() {
        candidate
    } else {
        base_dir.join(candidate)
    }
}

fn config_dir(path: &Path) -> Result<PathBuf> {
    let absolute = std::fs::canonicalize(path).map_err(|e| MinervaError::Config {
        path: path.display().to_string(),
        message: format!("cannot resolve config path: {e}"),
    })?;
    Ok(absolute.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")))
}

#[derive(Debug, Deserialize)]
struct RawIndexConfig {
    chromadb_path: PathBuf,
    collection: RawCollectionSpec,
    provider: ProviderConfig,
}

#[derive(Debug, Deserialize)]
struct RawCollectionSpec {
    name: String,
    description: String,
    json_file: PathBuf,
    #[serde(default)]
    chunk_size: Option<usize>,
    #[serde(default)]
    force_recreate: bool,
    #[serde(default)]
    skip_ai_validation: bool,
}

const DEFAULT_CHUNK_SIZE: usize = 1200;

/// Loads an index-run config: `chromadb_path`, `collection{...}`,
/// `provider{...}`, with all paths resolved absolute.
pub fn load_index_config(path: &Path) -> Result<IndexConfig> {
    let raw: RawIndexConfig = read_and_parse(path)?;
    let dir = config_dir(path)?;

    if raw.collection.name.trim().is_empty() {
        return Err(MinervaError::Config {
            path: path.display().to_string(),
            message: "collection.name must not be empty".to_string(),
        });
    }

    Ok(IndexConfig {
        chromadb_path: resolve_relative(&dir, raw.chromadb_path),
        collection: CollectionSpec {
            name: raw.collection.name,
            description: raw.collection.description,
            json_file: resolve_relative(&dir, raw.collection.json_file),
            chunk_size: raw.collection.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            force_recreate: raw.collection.force_recreate,
            skip_ai_validation: raw.collection.skip_ai_validation,
        },
        provider: raw.provider,
    })
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub chromadb_path: PathBuf,
    pub default_max_results: usize,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
struct RawServerConfig {
    chromadb_path: PathBuf,
    #[serde(default = "default_max_results")]
    default_max_results: usize,
    #[serde(default = "default_host")]
    host: String,
    #[serde(default = "default_port")]
    port: u16,
}

fn default_max_results() -> usize {
    5
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8787
}

/// Loads a server config: `chromadb_path`, `default_max_results
/// (1..15)`, optional `host`/`port`.
pub fn load_server_config(path: &Path) -> Result<ServerConfig> {
    let raw: RawServerConfig = read_and_parse(path)?;
    let dir = config_dir(path)?;

    if !(1..=15).contains(&raw.default_max_results) {
        return Err(MinervaError::Config {
            path: path.display().to_string(),
            message: format!("default_max_results must be in 1..15, got {}", raw.default_max_results),
        });
    }

    Ok(ServerConfig {
        chromadb_path: resolve_relative(&dir, raw.chromadb_path),
        default_max_results: raw.default_max_results,
        host: raw.host,
        port: raw.port,
    })
}

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub chromadb_path: PathBuf,
    pub provider: ProviderConfig,
    pub mcp_server_url: String,
    pub conversation_dir: PathBuf,
    pub enable_streaming: bool,
    pub max_tool_iterations: u32,
}

#[derive(Debug, Deserialize)]
struct RawChatConfig {
    chromadb_path: PathBuf,
    provider: ProviderConfig,
    mcp_server_url: String,
    conversation_dir: PathBuf,
    #[serde(default)]
    enable_streaming: bool,
    #[serde(default = "default_max_tool_iterations")]
    max_tool_iterations: u32,
}

fn default_max_tool_iterations() -> u32 {
    8
}

/// Loads a chat-client config: `chromadb_path`, `provider{...}`,
/// `mcp_server_url`, `conversation_dir`, optional `enable_streaming`
/// and `max_tool_iterations`.
pub fn load_chat_config(path: &Path) -> Result<ChatConfig> {
    let raw: RawChatConfig = read_and_parse(path)?;
    let dir = config_dir(path)?;

    if raw.mcp_server_url.trim().is_empty() {
        return Err(MinervaError::Config {
            path: path.display().to_string(),
            message: "mcp_server_url must not be empty".to_string(),
        });
    }

    Ok(ChatConfig {
        chromadb_path: resolve_relative(&dir, raw.chromadb_path),
        provider: raw.provider,
        mcp_server_url: raw.mcp_server_url,
        conversation_dir: resolve_relative(&dir, raw.conversation_dir),
        enable_streaming: raw.enable_streaming,
        max_tool_iterations: raw.max_tool_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn index_config_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.json"), "[]").unwrap();
        let path = write(
            dir.path(),
            "index.toml",
            r#"
            chromadb_path = "db"
            [collection]
            name = "notes"
            description = "a test collection"
            json_file = "notes.json"
            [provider]
            providerType = "ollama"
            "#,
        );
        let config = load_index_config(&path).unwrap();
        assert!(config.chromadb_path.is_absolute());
        assert!(config.collection.json_file.is_absolute());
        assert_eq!(config.collection.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn server_config_rejects_out_of_range_max_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "server.toml",
            r#"
            chromadb_path = "db"
            default_max_results = 50
            "#,
        );
        let err = load_server_config(&path).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }

    #[test]
    fn chat_config_rejects_empty_mcp_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "chat.toml",
            r#"
            chromadb_path = "db"
            mcp_server_url = ""
            conversation_dir = "conversations"
            [provider]
            providerType = "openai"
            apiKeyRef = "OPENAI_API_KEY"
            "#,
        );
        let err = load_chat_config(&path).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
