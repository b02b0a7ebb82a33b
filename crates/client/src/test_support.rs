use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chatcache_core::Error;
use reqwest::{StatusCode, Url, header};

use crate::fetch::{FetchRequest, FetchResponse, Network};

/// In-memory origin. Routes are matched on the URL without its query string;
/// unknown routes answer 404.
pub(crate) struct ScriptedNetwork {
    routes: Mutex<HashMap<String, (StatusCode, &'static str, Bytes)>>,
    online: AtomicBool,
    requests: Mutex<Vec<FetchRequest>>,
}

impl ScriptedNetwork {
    pub(crate) fn new() -> Self {
        Self { routes: Mutex::new(HashMap::new()), online: AtomicBool::new(true), requests: Mutex::new(Vec::new()) }
    }

    pub(crate) fn route(self, url: &str, status: StatusCode, content_type: &'static str, body: &str) -> Self {
        self.set_route(url, status, content_type, body);
        self
    }

    pub(crate) fn set_route(&self, url: &str, status: StatusCode, content_type: &'static str, body: &str) {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, content_type, Bytes::copy_from_slice(body.as_bytes())));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn route_key(url: &Url) -> String {
    let mut key = url.clone();
    key.set_query(None);
    key.to_string()
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        self.requests.lock().unwrap().push(request.clone());

        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("{} {}: offline", request.method, request.url)));
        }

        let route = self.routes.lock().unwrap().get(&route_key(&request.url)).cloned();
        let (status, content_type, bytes) =
            route.unwrap_or((StatusCode::NOT_FOUND, "text/plain", Bytes::from_static(b"not found")));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));

        Ok(FetchResponse {
            url: request.url.clone(),
            final_url: request.url.clone(),
            status,
            content_type: Some(content_type.to_string()),
            bytes,
            headers,
            fetch_ms: 1,
        })
    }
}
