//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use chatcache_client::CacheGateway;
use chatcache_core::{CacheDb, StorageReclaimer};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

use crate::tools::{GatewayFetchParams, StorageCleanupParams, buckets_impl, cleanup_impl, fetch_impl, status_impl};

/// The main MCP server handler for chatcache.
#[derive(Clone)]
pub struct ChatCacheServer {
    cache: CacheDb,
    gateway: Arc<CacheGateway>,
    reclaimer: StorageReclaimer,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl ChatCacheServer {
    /// Create a new server handler over an installed gateway.
    pub fn new(cache: CacheDb, gateway: Arc<CacheGateway>, reclaimer: StorageReclaimer) -> Self {
        Self { cache, gateway, reclaimer, tool_router: Self::tool_router() }
    }

    /// Send one request through the cache gateway.
    ///
    /// Network first; on failure the stored copy or an offline 503 is returned.
    #[tool(description = "Fetch a URL through the offline cache gateway. Reports whether the network, the cache or the offline fallback answered.")]
    async fn gateway_fetch(&self, params: Parameters<GatewayFetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.gateway, params.0).await
    }

    #[tool(description = "Report chat storage usage against quota and whether it is above the warning threshold.")]
    async fn storage_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.reclaimer).await
    }

    /// Free space now, regardless of current usage.
    #[tool(description = "Delete unreferenced images, then trim every conversation to its newest messages.")]
    async fn storage_cleanup(&self, params: Parameters<StorageCleanupParams>) -> Result<CallToolResult, McpError> {
        cleanup_impl(&self.reclaimer, params.0).await
    }

    #[tool(description = "List response buckets with entry counts and the gateway lifecycle state.")]
    async fn cache_buckets(&self) -> Result<CallToolResult, McpError> {
        buckets_impl(&self.cache, &self.gateway).await
    }
}

impl ServerHandler for ChatCacheServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "chatcache".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
