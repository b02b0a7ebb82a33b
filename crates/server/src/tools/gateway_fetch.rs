//! gateway_fetch tool implementation.
//!
//! Sends one request through the cache gateway and reports which layer
//! answered it.

use chatcache_client::{CacheGateway, FetchRequest, Method, resolve};
use chatcache_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Input parameters for the gateway_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayFetchParams {
    /// Absolute URL, or a URL relative to the application origin (e.g. "./index.html").
    pub url: String,

    /// HTTP method (default: GET). Anything but GET bypasses the cache.
    #[serde(default = "default_method")]
    pub method: String,

    /// Optional request body, sent verbatim.
    #[serde(default)]
    pub body: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output structure for the gateway_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayFetchOutput {
    /// The resolved URL that was requested.
    pub url: String,
    /// Which layer answered: "network", "cache" or "offline".
    pub source: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Body as text, absent when it is not valid UTF-8.
    pub body: Option<String>,
    /// Body length in bytes.
    pub bytes: usize,
    pub fetch_ms: u64,
}

/// Implementation of the gateway_fetch tool.
pub async fn fetch_impl(gateway: &CacheGateway, params: GatewayFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }

    let method = Method::from_bytes(params.method.trim().to_uppercase().as_bytes())
        .map_err(|e| ToolError::InvalidInput(format!("method {}: {e}", params.method)))?;
    let url = resolve(&gateway.config().origin, &params.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    let mut request = FetchRequest::new(method, url.clone());
    if let Some(body) = params.body {
        request = request.with_body(body);
    }

    let answer = gateway.handle(request).await?;
    let response = answer.response;
    tracing::debug!(%url, source = answer.source.as_str(), status = response.status.as_u16(), "gateway answered");

    let output = GatewayFetchOutput {
        url: url.to_string(),
        source: answer.source.as_str().to_string(),
        status: response.status.as_u16(),
        content_type: response.content_type,
        body: String::from_utf8(response.bytes.to_vec()).ok(),
        bytes: response.bytes.len(),
        fetch_ms: response.fetch_ms,
    };

    json_result(&output)
}
