//! MCP tool implementations.
//!
//! This module contains all tools exposed by the chatcache server.

pub mod buckets;
pub mod gateway_fetch;
pub mod storage;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

pub use buckets::buckets_impl;
pub use gateway_fetch::{GatewayFetchParams, fetch_impl};
pub use storage::{StorageCleanupParams, cleanup_impl, status_impl};

/// Wrap a tool output as pretty-printed JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::OutputFailed(format!("Failed to serialize output: {e}")))?;

    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Decode the JSON text a tool returned. Test helper.
#[cfg(test)]
pub(crate) fn decode_output<T: serde::de::DeserializeOwned>(result: &CallToolResult) -> T {
    let content_val = serde_json::to_value(&result.content[0]).unwrap();
    let text = content_val
        .get("text")
        .and_then(|v| v.as_str())
        .expect("Expected text field in content");
    serde_json::from_str(text).unwrap()
}
