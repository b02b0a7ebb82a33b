//! storage_cleanup tool implementation.
//!
//! Runs a full cleanup regardless of current usage: orphaned images first,
//! then message compression.

use chatcache_core::{CleanupReport, StorageReclaimer};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ToolError;
use crate::tools::json_result;

/// Parameters for the storage_cleanup tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct StorageCleanupParams {
    /// Messages kept per conversation. Defaults to the configured cap.
    #[serde(default)]
    pub max_messages_per_chat: Option<usize>,
}

/// Output from the storage_cleanup tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageCleanupOutput {
    pub report: CleanupReport,
    /// Cap that was applied.
    pub max_messages_per_chat: usize,
}

/// Implementation of the storage_cleanup tool.
pub async fn cleanup_impl(
    reclaimer: &StorageReclaimer, params: StorageCleanupParams,
) -> Result<CallToolResult, McpError> {
    let report = match params.max_messages_per_chat {
        Some(0) => return Err(ToolError::InvalidInput("max_messages_per_chat must be at least 1".into()).into()),
        Some(cap) => reclaimer.with_max_messages_per_chat(cap).perform_full_cleanup().await,
        None => reclaimer.perform_full_cleanup().await,
    };

    let max_messages_per_chat = params
        .max_messages_per_chat
        .unwrap_or(reclaimer.config().max_messages_per_chat);

    json_result(&StorageCleanupOutput { report, max_messages_per_chat })
}
