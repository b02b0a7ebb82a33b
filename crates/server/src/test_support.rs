use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chatcache_client::{
    CacheGateway, ClientRegistry, FetchRequest, FetchResponse, GatewayConfig, Network, StatusCode, Url, header,
};
use chatcache_core::{CacheDb, Error, ReclaimerConfig, StorageEstimate, StorageEstimator, StorageReclaimer};

/// Origin that serves the same HTML page for every URL until switched off.
pub(crate) struct StaticOrigin {
    online: AtomicBool,
}

impl StaticOrigin {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self { online: AtomicBool::new(true) })
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait]
impl Network for StaticOrigin {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{}: offline", request.url)));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/html"));
        Ok(FetchResponse {
            url: request.url.clone(),
            final_url: request.url.clone(),
            status: StatusCode::OK,
            content_type: Some("text/html".into()),
            bytes: Bytes::from_static(b"<html>chat</html>"),
            headers,
            fetch_ms: 1,
        })
    }
}

/// Estimator with a fixed reading.
pub(crate) struct FixedEstimator(pub u64, pub u64);

#[async_trait]
impl StorageEstimator for FixedEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, Error> {
        Ok(StorageEstimate { usage: self.0, quota: self.1 })
    }
}

/// Estimator that hands out readings in order, repeating the last one.
pub(crate) struct SteppingEstimator {
    readings: Mutex<VecDeque<(u64, u64)>>,
}

impl SteppingEstimator {
    pub(crate) fn new(readings: Vec<(u64, u64)>) -> Arc<Self> {
        Arc::new(Self { readings: Mutex::new(readings.into()) })
    }
}

#[async_trait]
impl StorageEstimator for SteppingEstimator {
    async fn estimate(&self) -> Result<StorageEstimate, Error> {
        let mut readings = self.readings.lock().unwrap();
        let next = if readings.len() > 1 { readings.pop_front() } else { readings.front().copied() };
        let (usage, quota) = next.unwrap_or_default();
        Ok(StorageEstimate { usage, quota })
    }
}

pub(crate) fn gateway_config(version: &str) -> GatewayConfig {
    GatewayConfig {
        version: version.to_string(),
        bucket_name: format!("chatcache-v{version}"),
        origin: Url::parse("https://chat.example/").unwrap(),
        precache_urls: vec!["./".into(), "./index.html".into()],
        max_cache_bytes: 1024 * 1024,
    }
}

pub(crate) fn gateway(cache: &CacheDb, origin: Arc<StaticOrigin>) -> Arc<CacheGateway> {
    Arc::new(CacheGateway::new(gateway_config("1"), origin, cache.clone(), ClientRegistry::new()))
}

pub(crate) fn reclaimer(cache: &CacheDb, usage: u64, quota: u64) -> StorageReclaimer {
    StorageReclaimer::new(Arc::new(cache.clone()), Arc::new(FixedEstimator(usage, quota)), ReclaimerConfig::default())
}
