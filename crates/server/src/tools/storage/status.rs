//! storage_status tool implementation.

use chatcache_core::{StorageReclaimer, StorageUsage};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Output from the storage_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StorageStatusOutput {
    pub usage: StorageUsage,
    /// False when usage is above the warning threshold.
    pub healthy: bool,
    pub warning_threshold: f64,
}

/// Implementation of the storage_status tool. Never cleans anything up.
pub async fn status_impl(reclaimer: &StorageReclaimer) -> Result<CallToolResult, McpError> {
    let usage = reclaimer.calculate_storage_size().await;
    let healthy = reclaimer.is_healthy(&usage);

    json_result(&StorageStatusOutput { usage, healthy, warning_threshold: reclaimer.config().warning_threshold })
}
