use super::*;
use crate::test_support::ScriptedNetwork;

const ORIGIN: &str = "https://chat.example/";

fn config(version: &str) -> GatewayConfig {
    GatewayConfig {
        version: version.to_string(),
        bucket_name: format!("chatcache-v{version}"),
        origin: Url::parse(ORIGIN).unwrap(),
        precache_urls: vec!["./".into(), "./index.html".into(), "https://cdn.example/lib/store.js".into()],
        max_cache_bytes: 64,
    }
}

/// Rejects every request with something other than a transport failure.
struct RejectingNetwork;

#[async_trait::async_trait]
impl Network for RejectingNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        Err(Error::InvalidUrl(request.url.to_string()))
    }
}

fn origin_network() -> ScriptedNetwork {
    ScriptedNetwork::new()
        .route("https://chat.example/", StatusCode::OK, "text/html", "<html>root</html>")
        .route("https://chat.example/index.html", StatusCode::OK, "text/html", "<html>index</html>")
        .route("https://cdn.example/lib/store.js", StatusCode::OK, "application/javascript", "store()")
        .route("https://chat.example/app.js", StatusCode::OK, "application/javascript", "app()")
}

async fn gateway(version: &str, network: Arc<ScriptedNetwork>, cache: CacheDb) -> CacheGateway {
    CacheGateway::new(config(version), network, cache, ClientRegistry::new())
}

fn get(url: &str) -> FetchRequest {
    FetchRequest::get(Url::parse(url).unwrap())
}

#[tokio::test]
async fn test_install_warms_seed_manifest() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network.clone(), cache.clone()).await;

    let report = gw.install().await.unwrap();
    assert_eq!(report, InstallReport { cached: 3, failed: 0 });
    assert_eq!(gw.state().await, LifecycleState::Installed);

    let bucket = cache.bucket("chatcache-v1");
    assert_eq!(bucket.entry_count().await.unwrap(), 3);
    let hit = bucket.match_url("https://chat.example/index.html").await.unwrap().unwrap();
    assert_eq!(hit.body, b"<html>index</html>");
}

#[tokio::test]
async fn test_install_tolerates_failed_seed() {
    let network = Arc::new(
        ScriptedNetwork::new()
            .route("https://chat.example/", StatusCode::OK, "text/html", "<html>root</html>")
            .route("https://chat.example/index.html", StatusCode::OK, "text/html", "<html>index</html>"),
    );
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network, cache.clone()).await;

    let report = gw.install().await.unwrap();
    assert_eq!(report, InstallReport { cached: 2, failed: 1 });
    assert_eq!(gw.state().await, LifecycleState::Installed);
    assert!(
        cache
            .bucket("chatcache-v1")
            .match_url("https://cdn.example/lib/store.js")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_activate_purges_other_buckets_and_notifies() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    cache.open_bucket("chatcache-v0").await.unwrap();
    cache.open_bucket("unrelated").await.unwrap();

    let gw = gateway("1", network, cache.clone()).await;
    let mut client = gw.clients().subscribe();

    gw.install().await.unwrap();
    let report = gw.activate().await.unwrap();

    assert_eq!(report.deleted_buckets, vec!["chatcache-v0", "unrelated"]);
    assert_eq!(report.notified_clients, 1);
    assert_eq!(cache.bucket_names().await.unwrap(), vec!["chatcache-v1"]);
    assert_eq!(gw.state().await, LifecycleState::Activated);
    assert_eq!(gw.clients().controller().as_deref(), Some("1"));
    assert_eq!(client.recv().await.unwrap(), ClientMessage::SwUpdated { version: "1".into() });
}

#[tokio::test]
async fn test_lifecycle_order_is_enforced() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network, cache).await;

    assert!(matches!(gw.activate().await, Err(Error::InvalidState(_))));
    gw.install().await.unwrap();
    assert!(matches!(gw.install().await, Err(Error::InvalidState(_))));
    gw.activate().await.unwrap();
    assert!(matches!(gw.activate().await, Err(Error::InvalidState(_))));
}

#[tokio::test]
async fn test_non_get_bypasses_cache() {
    let network = Arc::new(ScriptedNetwork::new().route(
        "https://chat.example/api/messages",
        StatusCode::OK,
        "application/json",
        "{\"ok\":true}",
    ));
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network.clone(), cache.clone()).await;

    let request = FetchRequest::new(Method::POST, Url::parse("https://chat.example/api/messages").unwrap())
        .with_body("{\"text\":\"hi\"}");
    let answer = gw.handle(request).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(answer.response.status, StatusCode::OK);

    gw.settle().await;
    assert_eq!(gw.pending_writes().await, 0);
    assert!(cache.bucket_names().await.unwrap().is_empty());

    network.set_online(false);
    let request = FetchRequest::new(Method::POST, Url::parse("https://chat.example/api/messages").unwrap());
    assert!(matches!(gw.handle(request).await, Err(Error::Network(_))));
    assert_eq!(network.request_count(), 2);
}

#[tokio::test]
async fn test_asset_network_first_then_cache_then_offline() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    cache.open_bucket("chatcache-v1").await.unwrap();
    let gw = gateway("1", network.clone(), cache).await;

    let online = gw.handle(get("https://chat.example/app.js")).await.unwrap();
    assert_eq!(online.source, ResponseSource::Network);
    gw.settle().await;

    network.set_online(false);
    let cached = gw.handle(get("https://chat.example/app.js")).await.unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.response.status, StatusCode::OK);
    assert_eq!(cached.response.bytes, Bytes::from_static(b"app()"));
    assert_eq!(cached.response.content_type.as_deref(), Some("application/javascript"));

    let missing = gw.handle(get("https://chat.example/missing.png")).await.unwrap();
    assert_eq!(missing.source, ResponseSource::Offline);
    assert_eq!(missing.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(missing.response.status.canonical_reason(), Some("Service Unavailable"));
    assert_eq!(missing.response.bytes, Bytes::from_static(OFFLINE_MESSAGE.as_bytes()));
    assert_eq!(missing.response.content_type.as_deref(), Some("text/plain; charset=utf-8"));
    assert_eq!(
        missing.response.headers.get(header::CONTENT_TYPE).unwrap(),
        "text/plain; charset=utf-8"
    );
}

#[tokio::test]
async fn test_document_is_cache_busted_and_stored_under_original_url() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    cache.open_bucket("chatcache-v1").await.unwrap();
    let gw = gateway("1", network.clone(), cache.clone()).await;

    let answer = gw.handle(get("https://chat.example/index.html")).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    gw.settle().await;

    let sent = network.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].cache_mode, CacheMode::NoStore);
    assert_eq!(sent[0].url.path(), "/index.html");
    let stamp = sent[0]
        .url
        .query_pairs()
        .find(|(k, _)| k == "t")
        .map(|(_, v)| v.into_owned())
        .unwrap();
    assert!(stamp.parse::<i64>().unwrap() > 0);

    let bucket = cache.bucket("chatcache-v1");
    assert_eq!(bucket.entry_count().await.unwrap(), 1);
    let stored = bucket.match_url("https://chat.example/index.html").await.unwrap().unwrap();
    assert_eq!(stored.url, "https://chat.example/index.html");
    assert_eq!(stored.body, b"<html>index</html>");
}

#[tokio::test]
async fn test_document_offline_uses_cache_or_fails() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network.clone(), cache).await;
    gw.install().await.unwrap();

    network.set_online(false);
    let root = gw.handle(get("https://chat.example/")).await.unwrap();
    assert_eq!(root.source, ResponseSource::Cache);
    assert_eq!(root.response.bytes, Bytes::from_static(b"<html>root</html>"));

    let miss = gw.handle(get("https://chat.example/settings/")).await;
    assert!(matches!(miss, Err(Error::CacheMiss(_))));
}

#[tokio::test]
async fn test_non_200_is_returned_but_not_stored() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network.clone(), cache.clone()).await;

    let answer = gw.handle(get("https://chat.example/nope.js")).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(answer.response.status, StatusCode::NOT_FOUND);
    assert_eq!(gw.pending_writes().await, 0);

    gw.settle().await;
    assert!(cache.match_any("https://chat.example/nope.js").await.unwrap().is_none());
}

#[tokio::test]
async fn test_store_does_not_block_response() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    cache.open_bucket("chatcache-v1").await.unwrap();
    let gw = gateway("1", network, cache.clone()).await;

    gw.handle(get("https://chat.example/app.js")).await.unwrap();
    assert_eq!(gw.pending_writes().await, 1);

    gw.settle().await;
    assert_eq!(gw.pending_writes().await, 0);
    assert!(cache.match_any("https://chat.example/app.js").await.unwrap().is_some());
}

#[tokio::test]
async fn test_new_version_supersedes_old() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let clients = ClientRegistry::new();
    let mut app = clients.subscribe();

    let v1 = CacheGateway::new(config("1"), network.clone(), cache.clone(), clients.clone());
    v1.install().await.unwrap();
    v1.activate().await.unwrap();
    assert_eq!(app.recv().await.unwrap(), ClientMessage::SwUpdated { version: "1".into() });

    network.set_route("https://chat.example/index.html", StatusCode::OK, "text/html", "<html>v2</html>");
    let v2 = CacheGateway::new(config("2"), network.clone(), cache.clone(), clients.clone());
    v2.install().await.unwrap();
    assert_eq!(cache.bucket_names().await.unwrap(), vec!["chatcache-v1", "chatcache-v2"]);

    let report = v2.activate().await.unwrap();
    assert_eq!(report.deleted_buckets, vec!["chatcache-v1"]);
    assert_eq!(clients.controller().as_deref(), Some("2"));
    assert_eq!(app.recv().await.unwrap(), ClientMessage::SwUpdated { version: "2".into() });

    network.set_online(false);
    let doc = v2.handle(get("https://chat.example/index.html")).await.unwrap();
    assert_eq!(doc.source, ResponseSource::Cache);
    assert_eq!(doc.response.bytes, Bytes::from_static(b"<html>v2</html>"));
}

#[tokio::test]
async fn test_oversized_response_is_returned_but_not_stored() {
    let big = "x".repeat(100);
    let network = Arc::new(
        origin_network()
            .route("https://chat.example/bundle.js", StatusCode::OK, "application/javascript", &big)
            .route("https://chat.example/big.html", StatusCode::OK, "text/html", &big)
            .route("https://chat.example/api/export", StatusCode::OK, "application/json", &big),
    );
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network.clone(), cache.clone()).await;
    gw.install().await.unwrap();

    let asset = gw.handle(get("https://chat.example/bundle.js")).await.unwrap();
    assert_eq!(asset.source, ResponseSource::Network);
    assert_eq!(asset.response.status, StatusCode::OK);
    assert_eq!(asset.response.bytes.len(), 100);

    let doc = gw.handle(get("https://chat.example/big.html")).await.unwrap();
    assert_eq!(doc.source, ResponseSource::Network);
    assert_eq!(doc.response.bytes.len(), 100);
    assert_eq!(gw.pending_writes().await, 0);

    let post = gw
        .handle(FetchRequest::new(Method::POST, Url::parse("https://chat.example/api/export").unwrap()))
        .await
        .unwrap();
    assert_eq!(post.source, ResponseSource::Network);
    assert_eq!(post.response.bytes, Bytes::from(big));

    gw.settle().await;
    assert!(cache.match_any("https://chat.example/bundle.js").await.unwrap().is_none());
    assert!(cache.match_any("https://chat.example/big.html").await.unwrap().is_none());

    network.set_online(false);
    let offline = gw.handle(get("https://chat.example/bundle.js")).await.unwrap();
    assert_eq!(offline.source, ResponseSource::Offline);
}

#[tokio::test]
async fn test_oversized_seed_counts_as_failed() {
    let network = Arc::new(origin_network());
    network.set_route("https://cdn.example/lib/store.js", StatusCode::OK, "application/javascript", &"s".repeat(65));
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network, cache.clone()).await;

    let report = gw.install().await.unwrap();
    assert_eq!(report, InstallReport { cached: 2, failed: 1 });
    assert_eq!(cache.bucket("chatcache-v1").entry_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_only_transport_failures_fall_back_to_cache() {
    let cache = CacheDb::open_in_memory().await.unwrap();
    let bucket = cache.open_bucket("chatcache-v1").await.unwrap();
    for url in ["https://chat.example/app.js", "https://chat.example/index.html"] {
        let stored = chatcache_core::CachedResponse {
            url: url.to_string(),
            status_code: 200,
            headers: Vec::new(),
            body: b"stored".to_vec(),
            stored_at: String::new(),
        };
        bucket.put(&stored).await.unwrap();
    }
    let gw = CacheGateway::new(config("1"), Arc::new(RejectingNetwork), cache, ClientRegistry::new());

    assert!(matches!(gw.handle(get("https://chat.example/app.js")).await, Err(Error::InvalidUrl(_))));
    assert!(matches!(gw.handle(get("https://chat.example/index.html")).await, Err(Error::InvalidUrl(_))));
}

#[tokio::test]
async fn test_superseded_gateway_does_not_recreate_its_bucket() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let clients = ClientRegistry::new();

    let v1 = CacheGateway::new(config("1"), network.clone(), cache.clone(), clients.clone());
    v1.install().await.unwrap();
    v1.activate().await.unwrap();
    let v2 = CacheGateway::new(config("2"), network.clone(), cache.clone(), clients.clone());
    v2.install().await.unwrap();
    v2.activate().await.unwrap();

    let answer = v1.handle(get("https://chat.example/app.js")).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    assert_eq!(v1.pending_writes().await, 0);

    v1.settle().await;
    assert_eq!(cache.bucket_names().await.unwrap(), vec!["chatcache-v2"]);
    assert!(cache.match_any("https://chat.example/app.js").await.unwrap().is_none());
}

#[tokio::test]
async fn test_write_after_bucket_deleted_is_dropped() {
    let network = Arc::new(origin_network());
    let cache = CacheDb::open_in_memory().await.unwrap();
    let gw = gateway("1", network, cache.clone()).await;
    gw.install().await.unwrap();
    cache.delete_bucket("chatcache-v1").await.unwrap();

    let answer = gw.handle(get("https://chat.example/app.js")).await.unwrap();
    assert_eq!(answer.source, ResponseSource::Network);
    gw.settle().await;

    assert!(cache.bucket_names().await.unwrap().is_empty());
}

#[test]
fn test_gateway_config_from_app_config() {
    let app = AppConfig { cache_version: "9".into(), origin: "https://chat.example/app/".into(), ..Default::default() };
    let config = GatewayConfig::from_app_config(&app).unwrap();
    assert_eq!(config.version, "9");
    assert_eq!(config.bucket_name, app.bucket_name());
    assert_eq!(config.origin.as_str(), "https://chat.example/app/");
    assert_eq!(config.max_cache_bytes, app.max_bytes);

    let bad = AppConfig { origin: "not a url".into(), ..Default::default() };
    assert!(matches!(GatewayConfig::from_app_config(&bad), Err(Error::InvalidUrl(_))));
}

#[test]
fn test_labels_match_wire_names() {
    for source in [ResponseSource::Network, ResponseSource::Cache, ResponseSource::Offline] {
        assert_eq!(serde_json::to_value(source).unwrap(), serde_json::json!(source.as_str()));
    }
    for state in [
        LifecycleState::Installing,
        LifecycleState::Installed,
        LifecycleState::Activating,
        LifecycleState::Activated,
    ] {
        assert_eq!(serde_json::to_value(state).unwrap(), serde_json::json!(state.as_str()));
    }
}
