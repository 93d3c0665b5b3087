//! MCP Tool Surface (C9): a fixed tool registry exposing exactly
//! `list_knowledge_bases` and `search_knowledge_base`. Grounded on the
//! teacher's `McpBridge` (`rmcp::ServerHandler` bridging an existing
//! registry into MCP JSON-RPC), narrowed from tools+prompts to a
//! two-tool fixed surface over [`Discovery`] and [`VectorStore`].
//!
//! Transport-agnostic: the same [`McpServer`] serves stdio (via
//! `transport-io`) or HTTP+SSE (via `transport-streamable-http-server`)
//! — only the launcher function in `main.rs` differs.

use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Deserialize;
use serde_json::json;

use crate::discovery::Discovery;
use crate::errors::MinervaError;
use crate::search::{self, ContextMode};
use crate::store::VectorStore;

const LIST_KNOWLEDGE_BASES: &str = "list_knowledge_bases";
const SEARCH_KNOWLEDGE_BASE: &str = "search_knowledge_base";

#[derive(Clone)]
pub struct McpServer {
    discovery: Arc<Discovery>,
    store: Arc<dyn VectorStore>,
    default_max_results: usize,
}

impl McpServer {
    pub fn new(discovery: Arc<Discovery>, store: Arc<dyn VectorStore>, default_max_results: usize) -> Self {
        McpServer { discovery, store, default_max_results }
    }

    fn tool_descriptors(&self) -> Vec<Tool> {
        vec![
            Tool {
                name: Cow::Borrowed(LIST_KNOWLEDGE_BASES),
                title: None,
                description: Some(Cow::Borrowed(
                    "Lists every available knowledge base collection with its description, note count, \
                     embedding model, and chunk count. Call this first to decide which collection_name to \
                     pass to search_knowledge_base.",
                )),
                input_schema: Arc::new(
                    json!({"type": "object", "properties": {}})
                        .as_object()
                        .cloned()
                        .unwrap_or_default(),
                ),
                output_schema: None,
                annotations: Some(ToolAnnotations::new().read_only(true)),
                execution: None,
                icons: None,
                meta: None,
            },
            Tool {
                name: Cow::Borrowed(SEARCH_KNOWLEDGE_BASE),
                title: None,
                description: Some(Cow::Borrowed(
                    "Searches a knowledge base collection by semantic similarity and returns the best \
                     matching note excerpts. Always cite noteTitle when quoting a result in a user-facing \
                     answer. If your client rejects the response for exceeding a token limit, retry with a \
                     smaller max_results.",
                )),
                input_schema: Arc::new(
                    json!({
                        "type": "object",
                        "properties": {
                            "query": {"type": "string"},
                            "collection_name": {"type": "string"},
                            "max_results": {"type": "integer", "minimum": 1, "maximum": search::MAX_K},
                            "context_mode": {"type": "string", "enum": ["chunk_only", "enhanced"]},
                        },
                        "required": ["query", "collection_name"],
                    })
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
                ),
                output_schema: None,
                annotations: Some(ToolAnnotations::new().read_only(true)),
                execution: None,
                icons: None,
                meta: None,
            },
        ]
    }

    async fn dispatch(&self, name: &str, arguments: serde_json::Value) -> Result<serde_json::Value, MinervaError> {
        match name {
            LIST_KNOWLEDGE_BASES => {
                let summaries = search::list_knowledge_bases(&self.discovery, self.store.as_ref()).await?;
                Ok(json!(summaries))
            }
            SEARCH_KNOWLEDGE_BASE => {
                let args: SearchArgs = serde_json::from_value(arguments).map_err(|e| MinervaError::Validation {
                    field: "arguments".to_string(),
                    message: format!("invalid arguments: {e}"),
                })?;
                let k = args.max_results.unwrap_or(self.default_max_results);
                let mode: ContextMode = args.context_mode.as_deref().unwrap_or("enhanced").parse()?;
                let results = search::search(&self.discovery, self.store.as_ref(), &args.collection_name, &args.query, k, mode).await?;
                Ok(json!(results))
            }
            other => Err(MinervaError::Validation {
                field: "name".to_string(),
                message: format!("no tool registered with name: {other}"),
            }),
        }
    }
}

/// Shapes a [`MinervaError`] into the `{error, message, suggestion?}`
/// payload an MCP client can match on, rather than unstructured prose.
fn error_payload(error: &MinervaError) -> serde_json::Value {
    let suggestion = match error {
        MinervaError::CredentialMissing { variable } => Some(format!("export {variable}=... or run `minerva keychain set {variable}`")),
        MinervaError::IncompatibleCollection { .. } => Some("pass force_recreate: true to rebuild the collection".to_string()),
        MinervaError::CollectionNotFound { .. } => Some("call list_knowledge_bases to see available collection names".to_string()),
        MinervaError::DimensionMismatch { .. } => Some("the collection's provider was reconfigured after indexing; re-index it".to_string()),
        _ => None,
    };
    json!({
        "error": error.code(),
        "message": error.to_string(),
        "suggestion": suggestion,
    })
}

#[derive(Deserialize)]
struct SearchArgs {
    query: String,
    collection_name: String,
    #[serde(default)]
    max_results: Option<usize>,
    #[serde(default)]
    context_mode: Option<String>,
}

impl ServerHandler for McpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "minerva".to_string(),
                title: Some("Minerva".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Minerva — personal knowledge-management retrieval over indexed note collections. \
                 Call list_knowledge_bases to discover available collections, then \
                 search_knowledge_base to retrieve relevant excerpts. Always cite noteTitle when \
                 quoting a result."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult::with_all_items(self.tool_descriptors())))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_descriptors().into_iter().find(|t| t.name.as_ref() == name)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.map(serde_json::Value::Object).unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match self.dispatch(&request.name, arguments).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(error) => {
                let text = serde_json::to_string_pretty(&error_payload(&error)).unwrap_or_default();
                Ok(CallToolResult::error(vec![Content::text(text)]))
            }
        }
    }
}
