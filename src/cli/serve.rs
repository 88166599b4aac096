//! MCP server exposing the retrieval surface as two tools: a summarized
//! `search` and a follow-up `fetch_details`.

use anyhow::{Context, Result};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::Services;
use crate::search::disclosure::DEFAULT_TOP_K;
use crate::search::{ChunkStore, RetrievalSurface};

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SearchParams {
    /// Natural-language or keyword query.
    pub query: String,
    /// Number of results, between 1 and 10 (default: 3).
    #[serde(default)]
    pub top_k: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FetchParams {
    /// Document id taken from a `search` result.
    pub document_id: i64,
}

#[derive(Clone)]
pub struct DocsiftServer {
    surface: Arc<RetrievalSurface>,
    tool_router: ToolRouter<Self>,
}

impl DocsiftServer {
    pub fn new(surface: RetrievalSurface) -> Self {
        Self {
            surface: Arc::new(surface),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl DocsiftServer {
    #[tool(
        description = "Search indexed documents with hybrid keyword and semantic retrieval. Returns short snippets with document ids; call fetch_details with an id to read the full chunk."
    )]
    pub async fn search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let top_k = params.top_k.unwrap_or(DEFAULT_TOP_K as i64);
        debug!(query = %params.query, top_k, "search tool called");
        let report = self.surface.search_report(&params.query, top_k).await;
        Ok(CallToolResult::success(vec![Content::text(report)]))
    }

    #[tool(
        description = "Fetch the full text of a document chunk by id, together with the neighbouring chunks of the same source for context."
    )]
    pub async fn fetch_details(
        &self,
        Parameters(params): Parameters<FetchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        debug!(document_id = params.document_id, "fetch_details tool called");
        let report = self.surface.fetch_report(params.document_id).await;
        Ok(CallToolResult::success(vec![Content::text(report)]))
    }
}

#[tool_handler]
impl ServerHandler for DocsiftServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "docsift searches a local index of markdown and text documents. Use 'search' first to get compact results with ids, then 'fetch_details' for the full text of the chunks you need."
                    .to_string(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

/// Serve the MCP protocol on stdio until the client disconnects.
pub async fn run_mcp_server(services: Services) -> Result<()> {
    use rmcp::transport::stdio;

    let chunks = services.store.count_chunks().await?;
    if chunks == 0 {
        warn!(
            path = %services.config.store.path.display(),
            "index is empty, run `docsift index` to add documents"
        );
    }
    info!(chunks, "starting MCP server on stdio");

    let server = DocsiftServer::new(services.surface());
    let service = server
        .serve(stdio())
        .await
        .context("Failed to start MCP server")?;
    service.waiting().await?;

    Ok(())
}
