//! chatcache server entry point.
//!
//! Boots the cache gateway (install, then activate), schedules storage
//! maintenance and serves the MCP tools on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use chatcache_client::{CacheGateway, ClientRegistry, FetchClient, FetchConfig, GatewayConfig};
use chatcache_core::{AppConfig, CacheDb, DbEstimator, ReclaimerConfig, StorageReclaimer};
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod maintenance;
mod tools;

#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        version = %config.cache_version,
        origin = %config.origin,
        "Starting chatcache server on stdio transport"
    );

    let cache = CacheDb::open(&config.db_path).await?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);
    let gateway = Arc::new(CacheGateway::new(
        GatewayConfig::from_app_config(&config)?,
        network,
        cache.clone(),
        ClientRegistry::new(),
    ));
    gateway.install().await?;
    gateway.activate().await?;

    let estimator = Arc::new(DbEstimator::new(cache.clone(), config.max_storage_bytes));
    let reclaimer = StorageReclaimer::new(Arc::new(cache.clone()), estimator, ReclaimerConfig::from(&config));
    let maintenance = config
        .maintenance_interval()
        .map(|every| maintenance::spawn(reclaimer.clone(), every));

    let handler = handler::ChatCacheServer::new(cache, Arc::clone(&gateway), reclaimer);
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    if let Some(task) = maintenance {
        task.abort();
    }
    gateway.settle().await;

    Ok(())
}
