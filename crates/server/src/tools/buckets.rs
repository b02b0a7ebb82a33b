//! cache_buckets tool implementation.
//!
//! Lists every response bucket with its entry count, next to the gateway's
//! lifecycle state.

use chatcache_client::CacheGateway;
use chatcache_core::CacheDb;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BucketInfo {
    pub name: String,
    pub entries: u64,
    /// True for the bucket owned by the running version.
    pub current: bool,
}

/// Output from the cache_buckets tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheBucketsOutput {
    pub version: String,
    /// "installing", "installed", "activating" or "activated".
    pub state: String,
    /// Version in control of the application instances, if any.
    pub controller: Option<String>,
    /// Oldest first.
    pub buckets: Vec<BucketInfo>,
}

/// Implementation of the cache_buckets tool.
pub async fn buckets_impl(cache: &CacheDb, gateway: &CacheGateway) -> Result<CallToolResult, McpError> {
    let live = &gateway.config().bucket_name;

    let mut buckets = Vec::new();
    for name in cache.bucket_names().await? {
        let entries = cache.bucket(&name).entry_count().await?;
        let current = name == *live;
        buckets.push(BucketInfo { name, entries, current });
    }

    let output = CacheBucketsOutput {
        version: gateway.config().version.clone(),
        state: gateway.state().await.as_str().to_string(),
        controller: gateway.clients().controller(),
        buckets,
    };

    json_result(&output)
}
