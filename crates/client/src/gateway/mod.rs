//! Network-first request gateway with versioned offline fallback.
//!
//! ### Lifecycle
//! `Installing -> Installed -> Activating -> Activated`, never backwards.
//! Install warms the bucket of the current version from the seed manifest
//! and is ready immediately. Activate deletes every other bucket, claims all
//! application instances and tells them a new version is live.
//!
//! ### Request policy
//! - Non-GET requests go straight to the network; the cache is never touched.
//! - Documents (`*.html`, `*/`) are fetched cache-busted with `no-store` and
//!   stored under their original URL. Offline they come from any bucket or fail.
//! - Everything else is fetched normally and stored on 200. Offline it comes
//!   from any bucket, or a plain-text 503 is synthesized.
//!
//! Only transport failures fall back to the cache. A body larger than
//! `max_cache_bytes` is returned as fetched and never stored.
//!
//! Stores are write-through and fire-and-forget: the response is returned
//! without waiting for its cache write. Once another version controls the
//! clients, or this version's bucket is gone, writes are dropped.

mod clients;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use bytes::Bytes;
use chatcache_core::{AppConfig, CacheDb, Error};
use reqwest::{Method, StatusCode, Url, header};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinSet;

use crate::fetch::{CacheMode, FetchRequest, FetchResponse, Network, cache_busted, is_document, resolve};

pub use clients::{ClientMessage, ClientRegistry};

/// Body of the synthesized response when neither network nor cache can answer.
pub const OFFLINE_MESSAGE: &str = "Network connection failed. Please check your network settings.";

/// Version-specific settings of one gateway generation.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Version tag announced to clients.
    pub version: String,
    /// Name of the bucket owned by this version.
    pub bucket_name: String,
    /// Base for relative seed URLs.
    pub origin: Url,
    /// Seed manifest warmed on install.
    pub precache_urls: Vec<String>,
    /// Largest body stored in the bucket.
    pub max_cache_bytes: usize,
}

impl GatewayConfig {
    pub fn from_app_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.origin)))?;
        Ok(Self {
            version: config.cache_version.clone(),
            bucket_name: config.bucket_name(),
            origin,
            precache_urls: config.precache_urls.clone(),
            max_cache_bytes: config.max_bytes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Installing,
    Installed,
    Activating,
    Activated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Installing => "installing",
            LifecycleState::Installed => "installed",
            LifecycleState::Activating => "activating",
            LifecycleState::Activated => "activated",
        }
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Synthesized 503.
    Offline,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Offline => "offline",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub source: ResponseSource,
    pub response: FetchResponse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivateReport {
    pub deleted_buckets: Vec<String>,
    pub notified_clients: usize,
}

/// The fetch-interception layer.
pub struct CacheGateway {
    config: GatewayConfig,
    network: Arc<dyn Network>,
    cache: CacheDb,
    clients: ClientRegistry,
    state: RwLock<LifecycleState>,
    writes: Mutex<JoinSet<()>>,
}

impl CacheGateway {
    pub fn new(config: GatewayConfig, network: Arc<dyn Network>, cache: CacheDb, clients: ClientRegistry) -> Self {
        Self {
            config,
            network,
            cache,
            clients,
            state: RwLock::new(LifecycleState::Installing),
            writes: Mutex::new(JoinSet::new()),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    async fn expect_state(&self, expected: LifecycleState, next: LifecycleState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if *state != expected {
            return Err(Error::InvalidState(format!(
                "cannot move to {next:?} from {:?} (expected {expected:?})",
                *state
            )));
        }
        *state = next;
        Ok(())
    }

    /// Warm the current bucket from the seed manifest.
    ///
    /// A seed that cannot be fetched, does not answer 200, or is too large to
    /// store is logged and skipped. The gateway is ready as soon as this returns.
    pub async fn install(&self) -> Result<InstallReport, Error> {
        if self.state().await != LifecycleState::Installing {
            return Err(Error::InvalidState("install may only run once".into()));
        }
        tracing::info!(version = %self.config.version, bucket = %self.config.bucket_name, "installing");

        let bucket = self.cache.open_bucket(&self.config.bucket_name).await?;
        let mut report = InstallReport::default();
        let mut join_set = JoinSet::new();
        let max_cache_bytes = self.config.max_cache_bytes;

        for seed in &self.config.precache_urls {
            let url = match resolve(&self.config.origin, seed) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(seed = %seed, error = %e, "skipping invalid seed URL");
                    report.failed += 1;
                    continue;
                }
            };

            let network = Arc::clone(&self.network);
            let bucket = bucket.clone();
            join_set.spawn(async move {
                let result = async {
                    let response = network.fetch(&FetchRequest::get(url.clone())).await?;
                    if response.status != StatusCode::OK {
                        return Err(Error::Network(format!("unexpected status {}", response.status.as_u16())));
                    }
                    if response.bytes.len() > max_cache_bytes {
                        return Err(Error::FetchTooLarge(format!(
                            "{} bytes exceeds {max_cache_bytes}",
                            response.bytes.len()
                        )));
                    }
                    if !bucket.put(&response.to_cached(&url)).await? {
                        return Err(Error::InvalidState(format!("bucket {} was deleted", bucket.name())));
                    }
                    Ok(())
                }
                .await;
                (url, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((_, Ok(()))) => report.cached += 1,
                Ok((url, Err(e))) => {
                    tracing::warn!(%url, error = %e, "failed to precache");
                    report.failed += 1;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "precache task failed");
                    report.failed += 1;
                }
            }
        }

        self.expect_state(LifecycleState::Installing, LifecycleState::Installed)
            .await?;
        tracing::info!(cached = report.cached, failed = report.failed, "installed, taking over without waiting");
        Ok(report)
    }

    /// Retire every other bucket, claim all instances and announce the version.
    ///
    /// If retiring fails the gateway stays installed and activation can be retried.
    pub async fn activate(&self) -> Result<ActivateReport, Error> {
        self.expect_state(LifecycleState::Installed, LifecycleState::Activating)
            .await?;
        tracing::info!(version = %self.config.version, "activating");

        let deleted_buckets = match self.retire_old_buckets().await {
            Ok(deleted) => deleted,
            Err(e) => {
                *self.state.write().await = LifecycleState::Installed;
                return Err(e);
            }
        };

        let notified_clients = self.clients.claim(&self.config.version);
        *self.state.write().await = LifecycleState::Activated;

        tracing::info!(
            version = %self.config.version,
            deleted = deleted_buckets.len(),
            notified_clients,
            "activated"
        );
        Ok(ActivateReport { deleted_buckets, notified_clients })
    }

    async fn retire_old_buckets(&self) -> Result<Vec<String>, Error> {
        let mut deleted = Vec::new();
        for name in self.cache.bucket_names().await? {
            if name == self.config.bucket_name {
                continue;
            }
            tracing::info!(bucket = %name, "deleting old bucket");
            self.cache.delete_bucket(&name).await?;
            deleted.push(name);
        }
        Ok(deleted)
    }

    /// Answer one request according to the network-first policy.
    ///
    /// Only non-GET transport failures, offline documents with nothing stored
    /// and errors other than `Error::Network` come back as errors.
    pub async fn handle(&self, request: FetchRequest) -> Result<GatewayResponse, Error> {
        if request.method != Method::GET {
            let response = self.network.fetch(&request).await?;
            return Ok(GatewayResponse { source: ResponseSource::Network, response });
        }

        if is_document(&request.url) { self.handle_document(request).await } else { self.handle_asset(request).await }
    }

    async fn handle_document(&self, request: FetchRequest) -> Result<GatewayResponse, Error> {
        let original = request.url.clone();
        let busted = FetchRequest {
            url: cache_busted(&original, chrono::Utc::now().timestamp_millis()),
            cache_mode: CacheMode::NoStore,
            ..request
        };

        match self.network.fetch(&busted).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.store_in_background(&original, &response).await;
                }
                Ok(GatewayResponse { source: ResponseSource::Network, response })
            }
            Err(e @ Error::Network(_)) => {
                tracing::warn!(url = %original, error = %e, "document fetch failed, trying cache");
                match self.lookup(&original).await {
                    Some(response) => Ok(GatewayResponse { source: ResponseSource::Cache, response }),
                    None => Err(Error::CacheMiss(original.to_string())),
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn handle_asset(&self, request: FetchRequest) -> Result<GatewayResponse, Error> {
        match self.network.fetch(&request).await {
            Ok(response) => {
                if response.status == StatusCode::OK {
                    self.store_in_background(&request.url, &response).await;
                }
                Ok(GatewayResponse { source: ResponseSource::Network, response })
            }
            Err(e @ Error::Network(_)) => {
                tracing::warn!(url = %request.url, error = %e, "fetch failed, trying cache");
                match self.lookup(&request.url).await {
                    Some(response) => Ok(GatewayResponse { source: ResponseSource::Cache, response }),
                    None => Ok(GatewayResponse { source: ResponseSource::Offline, response: offline_response(&request.url) }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Search every bucket. Storage errors count as a miss.
    async fn lookup(&self, url: &Url) -> Option<FetchResponse> {
        let cached = match self.cache.match_any(url.as_str()).await {
            Ok(cached) => cached?,
            Err(e) => {
                tracing::warn!(%url, error = %e, "cache lookup failed");
                return None;
            }
        };

        match FetchResponse::from_cached(cached) {
            Ok(response) => Some(response),
            Err(e) => {
                tracing::warn!(%url, error = %e, "stored response unreadable");
                None
            }
        }
    }

    async fn store_in_background(&self, key: &Url, response: &FetchResponse) {
        if response.bytes.len() > self.config.max_cache_bytes {
            tracing::debug!(
                url = %key,
                bytes = response.bytes.len(),
                limit = self.config.max_cache_bytes,
                "response too large to cache"
            );
            return;
        }
        if let Some(controller) = self.clients.controller()
            && controller != self.config.version
        {
            tracing::debug!(url = %key, %controller, version = %self.config.version, "superseded, not caching");
            return;
        }

        let cached = response.to_cached(key);
        let bucket = self.cache.bucket(&self.config.bucket_name);

        let mut writes = self.writes.lock().await;
        while writes.try_join_next().is_some() {}
        writes.spawn(async move {
            match bucket.put(&cached).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(url = %cached.url, bucket = %bucket.name(), "bucket gone, write dropped"),
                Err(e) => {
                    tracing::warn!(url = %cached.url, bucket = %bucket.name(), error = %e, "cache write failed")
                }
            }
        });
    }

    /// Number of cache writes spawned and not yet reaped.
    pub async fn pending_writes(&self) -> usize {
        self.writes.lock().await.len()
    }

    /// Wait for every outstanding cache write.
    pub async fn settle(&self) {
        let mut writes = self.writes.lock().await;
        while let Some(joined) = writes.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "cache write task failed");
            }
        }
    }
}

/// The plain-text 503 served when a request can be answered neither from the
/// network nor from any bucket.
pub fn offline_response(url: &Url) -> FetchResponse {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; charset=utf-8"));

    FetchResponse {
        url: url.clone(),
        final_url: url.clone(),
        status: StatusCode::SERVICE_UNAVAILABLE,
        content_type: Some("text/plain; charset=utf-8".to_string()),
        bytes: Bytes::from_static(OFFLINE_MESSAGE.as_bytes()),
        headers,
        fetch_ms: 0,
    }
}
