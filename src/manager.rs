//! The asset cache manager: install, activate and fetch handlers.

use std::fmt;

use futures::future;

use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::format::{format_bytes, format_duration};
use crate::network::{HttpNetwork, Network};
use crate::request::{Request, Response};
use crate::stats::{ActivationStats, InstallStats, InstallStatsBuilder};
use crate::store::{CacheStorage, DiskStorage};

/// Where a handled request's response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseSource {
    /// Matched in the current store; the network was not touched.
    Cache,
    /// Fetched live after a cache miss.
    Network,
    /// The cached offline document, served after a network failure.
    Fallback,
}

impl ResponseSource {
    /// Short lowercase label, suitable for headers and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Network => "network",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A response chosen by [`AssetCacheManager::handle_fetch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Served {
    /// The response to hand back to the requester.
    pub response: Response,
    /// Which path produced it.
    pub source: ResponseSource,
}

/// Keeps a named store populated with the precache assets, removes stores
/// left behind by older versions, and answers requests cache-first.
///
/// Storage and network are injected so the manager runs unchanged against
/// an in-memory store in tests and a disk store in the host.
pub struct AssetCacheManager<S: CacheStorage = DiskStorage, N: Network = HttpNetwork> {
    storage: S,
    network: N,
    config: CacheConfig,
}

impl<S: CacheStorage, N: Network> AssetCacheManager<S, N> {
    /// Creates a manager with the compiled-in cache name and asset list.
    #[must_use]
    pub fn new(storage: S, network: N) -> Self {
        Self::with_config(storage, network, CacheConfig::default())
    }

    /// Creates a manager with a custom cache configuration.
    #[must_use]
    pub const fn with_config(storage: S, network: N, config: CacheConfig) -> Self {
        Self {
            storage,
            network,
            config,
        }
    }

    /// Returns a reference to the underlying storage.
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns a reference to the underlying network.
    #[must_use]
    pub const fn network(&self) -> &N {
        &self.network
    }

    /// Returns a reference to the cache configuration.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Retrieves one precache asset, treating anything but a 2xx as failure.
    async fn precache_asset(&self, url: &str) -> Result<(Request, Response)> {
        let request = Request::get(url).relative_to(&self.config.origin);
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::AssetUnreachable {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        if !response.is_ok() {
            return Err(Error::AssetStatus {
                url: url.to_string(),
                status: response.status,
            });
        }
        log::debug!("Retrieved {url} ({})", format_bytes(response.len()));
        Ok((request, response))
    }

    /// Install handler: opens the current store and fills it with every asset.
    ///
    /// All assets are retrieved before anything is written, then committed in
    /// a single [`CacheStorage::put_all`]. If any asset fails, nothing is
    /// committed and the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AssetUnreachable`] or [`Error::AssetStatus`] for the
    /// first asset that fails, or a storage error.
    pub async fn install(&self) -> Result<InstallStats> {
        let name = &self.config.cache_name;
        let mut builder = InstallStatsBuilder::new(name);

        self.storage.open(name).await?;

        let entries = future::try_join_all(
            self.config.assets.iter().map(|url| self.precache_asset(url)),
        )
        .await
        .inspect_err(|e| log::error!("Install of {name} aborted: {e}"))?;

        for (_, response) in &entries {
            builder.add_asset(response.len());
        }
        self.storage.put_all(name, entries).await?;

        let stats = builder.build();
        log::info!(
            "Installed {} asset(s) into {name}: {} in {}",
            stats.assets,
            format_bytes(stats.total_bytes),
            format_duration(stats.elapsed),
        );
        Ok(stats)
    }

    /// Activate handler: deletes every store not named after this version.
    ///
    /// Deletions run concurrently and independently; a failed deletion is
    /// logged and reported without stopping the others.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store names cannot be listed.
    pub async fn activate(&self) -> Result<ActivationStats> {
        let current = &self.config.cache_name;
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let results = future::join_all(stale.into_iter().map(|name| async move {
            let result = self.storage.delete(&name).await;
            (name, result)
        }))
        .await;

        let mut stats = ActivationStats::default();
        for (name, result) in results {
            match result {
                Ok(true) => {
                    log::info!("Deleted stale cache {name}");
                    stats.deleted.push(name);
                }
                Ok(false) => log::debug!("Stale cache {name} already gone"),
                Err(e) => {
                    log::warn!("Failed to delete stale cache {name}: {e}");
                    stats.failed.push((name, e.to_string()));
                }
            }
        }

        log::info!(
            "Activated {current}: {} stale cache(s) deleted, {} failed",
            stats.deleted.len(),
            stats.failed.len()
        );
        Ok(stats)
    }

    /// Fetch handler: cache first, then network, then the offline fallback.
    ///
    /// Responses fetched from the network are returned as-is and never
    /// written back into the store. An HTTP error status counts as a
    /// network answer, not a failure. Absolute URLs on the configured origin
    /// are matched as their origin-relative paths.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Offline`] if the request misses the cache, the
    /// network fails, and the fallback document is not cached. Storage
    /// errors are propagated.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Served> {
        let name = &self.config.cache_name;
        let request = &request.relative_to(&self.config.origin);

        if let Some(response) = self.storage.match_request(name, request).await? {
            log::debug!("{} {} served from {name}", request.method, request.url);
            return Ok(Served {
                response,
                source: ResponseSource::Cache,
            });
        }

        match self.network.fetch(request).await {
            Ok(response) => {
                log::debug!(
                    "{} {} served from network ({})",
                    request.method,
                    request.url,
                    response.status
                );
                Ok(Served {
                    response,
                    source: ResponseSource::Network,
                })
            }
            Err(e) => {
                log::debug!("Network failed for {}: {e}", request.url);
                let fallback = Request::get(self.config.fallback_url.as_str());
                match self.storage.match_request(name, &fallback).await? {
                    Some(response) => {
                        log::info!(
                            "Offline: serving cached {} for {}",
                            self.config.fallback_url,
                            request.url
                        );
                        Ok(Served {
                            response,
                            source: ResponseSource::Fallback,
                        })
                    }
                    None => Err(Error::Offline {
                        url: request.url.clone(),
                    }),
                }
            }
        }
    }

    /// Fetch handler returning only the response.
    ///
    /// # Errors
    ///
    /// See [`handle_fetch`](Self::handle_fetch).
    pub async fn respond(&self, request: &Request) -> Result<Response> {
        self.handle_fetch(request).await.map(|served| served.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::config::PRECACHE_ASSETS;
    use crate::request::RequestKey;
    use crate::store::MemoryStorage;

    // =========================================================================
    // Test doubles
    // =========================================================================

    /// A scripted network that counts calls.
    struct MockNetwork {
        /// Maps URL → response. Unknown URLs answer 404.
        routes: Mutex<HashMap<String, Response>>,
        /// URLs that fail with a transport error.
        unreachable: Mutex<Vec<String>>,
        /// When set, every request fails with a transport error.
        down: AtomicBool,
        calls: AtomicUsize,
    }

    impl MockNetwork {
        fn new() -> Self {
            Self {
                routes: Mutex::new(HashMap::new()),
                unreachable: Mutex::new(Vec::new()),
                down: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        fn serving(routes: &[(&str, &str)]) -> Self {
            let net = Self::new();
            for (url, body) in routes {
                net.route(url, Response::new(200, body.to_string()));
            }
            net
        }

        fn route(&self, url: &str, response: Response) {
            self.routes.lock().unwrap().insert(url.to_string(), response);
        }

        fn make_unreachable(&self, url: &str) {
            self.unreachable.lock().unwrap().push(url.to_string());
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn reset_calls(&self) {
            self.calls.store(0, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Network for MockNetwork {
        async fn fetch(&self, request: &Request) -> Result<Response> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst)
                || self.unreachable.lock().unwrap().contains(&request.url)
            {
                return Err(Error::Network {
                    url: request.url.clone(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(self
                .routes
                .lock()
                .unwrap()
                .get(&request.url)
                .cloned()
                .unwrap_or_else(|| Response::new(404, "not found")))
        }
    }

    /// Memory storage whose `delete` fails for chosen names.
    struct FlakyDeleteStorage {
        inner: MemoryStorage,
        fail_delete: Vec<String>,
    }

    #[async_trait]
    impl CacheStorage for FlakyDeleteStorage {
        async fn open(&self, name: &str) -> Result<()> {
            self.inner.open(name).await
        }

        async fn has(&self, name: &str) -> Result<bool> {
            self.inner.has(name).await
        }

        async fn keys(&self) -> Result<Vec<String>> {
            self.inner.keys().await
        }

        async fn delete(&self, name: &str) -> Result<bool> {
            if self.fail_delete.iter().any(|n| n == name) {
                return Err(Error::Store(format!("{name} is locked")));
            }
            self.inner.delete(name).await
        }

        async fn put_all(&self, name: &str, entries: Vec<(Request, Response)>) -> Result<()> {
            self.inner.put_all(name, entries).await
        }

        async fn match_request(&self, name: &str, request: &Request) -> Result<Option<Response>> {
            self.inner.match_request(name, request).await
        }

        async fn entries(&self, name: &str) -> Result<Vec<RequestKey>> {
            self.inner.entries(name).await
        }
    }

    fn site() -> MockNetwork {
        MockNetwork::serving(&[
            ("/", "<html>home</html>"),
            ("/static/css/style.css", "body {}"),
            ("/static/app.js", "console.log(1)"),
            ("/static/assets/icon-192.png", "png192"),
            ("/static/assets/icon-512.png", "png512"),
        ])
    }

    fn two_assets() -> CacheConfig {
        CacheConfig::new().with_assets(["/", "/static/css/style.css"])
    }

    // =========================================================================
    // Install
    // =========================================================================

    #[tokio::test]
    async fn install_stores_every_asset() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        let stats = manager.install().await.unwrap();

        assert_eq!(stats.assets, 5);
        assert_eq!(stats.cache_name, "wiki-clarity-v1");
        for url in &manager.config().assets {
            let hit = manager
                .storage()
                .match_request("wiki-clarity-v1", &Request::get(url.as_str()))
                .await
                .unwrap();
            assert!(hit.is_some(), "{url} missing after install");
        }
    }

    #[tokio::test]
    async fn install_two_assets_both_reachable() {
        let net = MockNetwork::serving(&[("/", "home"), ("/static/css/style.css", "css")]);
        let manager = AssetCacheManager::with_config(MemoryStorage::new(), net, two_assets());

        let stats = manager.install().await.unwrap();
        assert_eq!(stats.assets, 2);
        assert_eq!(stats.total_bytes, 7);
        assert_eq!(
            manager.storage().entries("wiki-clarity-v1").await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn install_fails_whole_when_one_asset_unreachable() {
        let net = MockNetwork::serving(&[("/", "home"), ("/static/css/style.css", "css")]);
        net.make_unreachable("/static/css/style.css");
        let manager = AssetCacheManager::with_config(MemoryStorage::new(), net, two_assets());

        let err = manager.install().await.unwrap_err();
        assert!(
            matches!(err, Error::AssetUnreachable { ref url, .. } if url == "/static/css/style.css")
        );
        assert!(
            manager
                .storage()
                .entries("wiki-clarity-v1")
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn install_fails_on_http_error_status() {
        let net = MockNetwork::serving(&[("/", "home")]);
        // style.css is not routed, so it answers 404
        let manager = AssetCacheManager::with_config(MemoryStorage::new(), net, two_assets());

        let err = manager.install().await.unwrap_err();
        assert!(matches!(err, Error::AssetStatus { status: 404, .. }));
        assert!(
            manager
                .storage()
                .match_request("wiki-clarity-v1", &Request::get("/"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn failed_reinstall_keeps_previous_entries() {
        let storage = MemoryStorage::new();
        storage
            .put_all(
                "wiki-clarity-v1",
                vec![(Request::get("/"), Response::new(200, "old home"))],
            )
            .await
            .unwrap();

        let net = MockNetwork::serving(&[("/", "new home")]);
        let manager = AssetCacheManager::with_config(storage, net, two_assets());
        assert!(manager.install().await.is_err());

        let hit = manager
            .storage()
            .match_request("wiki-clarity-v1", &Request::get("/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.body, "old home");
    }

    // =========================================================================
    // Activate
    // =========================================================================

    #[tokio::test]
    async fn activate_deletes_other_versions() {
        let storage = MemoryStorage::new();
        storage.open("wiki-clarity-v0").await.unwrap();
        storage.open("wiki-clarity-beta").await.unwrap();
        storage.open("wiki-clarity-v1").await.unwrap();

        let manager = AssetCacheManager::new(storage, MockNetwork::new());
        let stats = manager.activate().await.unwrap();

        assert!(stats.is_clean());
        assert_eq!(stats.deleted.len(), 2);
        assert_eq!(manager.storage().keys().await.unwrap(), vec!["wiki-clarity-v1"]);
    }

    #[tokio::test]
    async fn activate_with_only_current_store_is_noop() {
        let storage = MemoryStorage::new();
        storage.open("wiki-clarity-v1").await.unwrap();
        let manager = AssetCacheManager::new(storage, MockNetwork::new());

        let stats = manager.activate().await.unwrap();
        assert!(stats.deleted.is_empty());
        assert!(manager.storage().has("wiki-clarity-v1").await.unwrap());
    }

    #[tokio::test]
    async fn activate_continues_past_failed_delete() {
        let inner = MemoryStorage::new();
        for name in ["a-old", "b-locked", "c-old", "wiki-clarity-v1"] {
            inner.open(name).await.unwrap();
        }
        let storage = FlakyDeleteStorage {
            inner,
            fail_delete: vec!["b-locked".to_string()],
        };

        let manager = AssetCacheManager::new(storage, MockNetwork::new());
        let stats = manager.activate().await.unwrap();

        assert!(!stats.is_clean());
        assert_eq!(stats.failed.len(), 1);
        assert_eq!(stats.failed[0].0, "b-locked");
        assert_eq!(stats.deleted.len(), 2);
        assert_eq!(
            manager.storage().keys().await.unwrap(),
            vec!["b-locked", "wiki-clarity-v1"]
        );
    }

    // =========================================================================
    // Fetch
    // =========================================================================

    #[tokio::test]
    async fn cached_request_never_touches_network() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();
        manager.network().reset_calls();

        let served = manager
            .handle_fetch(&Request::get("/static/app.js"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body, "console.log(1)");
        assert_eq!(manager.network().calls(), 0);
    }

    #[tokio::test]
    async fn same_origin_absolute_url_hits_cache() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();
        manager.network().reset_calls();

        let served = manager
            .handle_fetch(&Request::get("http://127.0.0.1:5000/static/app.js"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body, "console.log(1)");
        assert_eq!(manager.network().calls(), 0);
    }

    #[tokio::test]
    async fn absolute_url_offline_gets_its_own_entry() {
        let config = CacheConfig::new().with_origin("https://clarity.example/");
        let manager = AssetCacheManager::with_config(MemoryStorage::new(), site(), config);
        manager.install().await.unwrap();
        manager.network().set_down(true);

        let served = manager
            .handle_fetch(&Request::get("https://clarity.example/static/css/style.css#top"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body, "body {}");

        // Another origin's URL with the same path is a different resource
        let served = manager
            .handle_fetch(&Request::get("https://cdn.example/static/css/style.css"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Fallback);
    }

    #[tokio::test]
    async fn miss_fetches_once_and_does_not_write_back() {
        let net = site();
        net.route("/privacy", Response::new(200, "privacy"));
        let manager = AssetCacheManager::new(MemoryStorage::new(), net);
        manager.install().await.unwrap();
        manager.network().reset_calls();

        let served = manager.handle_fetch(&Request::get("/privacy")).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(served.response.body, "privacy");
        assert_eq!(manager.network().calls(), 1);

        // Still a miss: nothing was written back
        assert!(
            manager
                .storage()
                .match_request("wiki-clarity-v1", &Request::get("/privacy"))
                .await
                .unwrap()
                .is_none()
        );
        manager.handle_fetch(&Request::get("/privacy")).await.unwrap();
        assert_eq!(manager.network().calls(), 2);
    }

    #[tokio::test]
    async fn http_error_status_is_not_a_network_failure() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();

        let served = manager.handle_fetch(&Request::get("/nope")).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(served.response.status, 404);
    }

    #[tokio::test]
    async fn offline_miss_serves_cached_root() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();
        manager.network().set_down(true);

        let served = manager
            .handle_fetch(&Request::get("/missing.png"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Fallback);
        assert_eq!(served.response.body, "<html>home</html>");
    }

    #[tokio::test]
    async fn offline_miss_without_root_is_offline_error() {
        let net = MockNetwork::new();
        net.set_down(true);
        let manager = AssetCacheManager::new(MemoryStorage::new(), net);

        let err = manager
            .handle_fetch(&Request::get("/missing.png"))
            .await
            .unwrap_err();
        assert!(err.is_offline());
        assert_eq!(manager.network().calls(), 1);
    }

    #[tokio::test]
    async fn non_get_requests_bypass_cache() {
        let net = site();
        net.route("/api/search", Response::new(200, "{\"ok\":true}"));
        let manager = AssetCacheManager::new(MemoryStorage::new(), net);
        manager.install().await.unwrap();
        manager.network().reset_calls();

        let served = manager
            .handle_fetch(&Request::new("POST", "/"))
            .await
            .unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(manager.network().calls(), 1);
    }

    #[tokio::test]
    async fn only_current_store_is_consulted() {
        let storage = MemoryStorage::new();
        storage
            .put_all(
                "wiki-clarity-v0",
                vec![(Request::get("/old.css"), Response::new(200, "old"))],
            )
            .await
            .unwrap();
        let net = MockNetwork::new();
        net.set_down(true);
        let manager = AssetCacheManager::new(storage, net);

        let err = manager.handle_fetch(&Request::get("/old.css")).await.unwrap_err();
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn concurrent_fetches_share_the_store() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();
        manager.network().reset_calls();

        let requests: Vec<Request> = (0..32)
            .map(|i| Request::get(PRECACHE_ASSETS[i % PRECACHE_ASSETS.len()]))
            .collect();
        let results =
            future::join_all(requests.iter().map(|r| manager.handle_fetch(r))).await;

        assert!(results
            .iter()
            .all(|r| r.as_ref().is_ok_and(|s| s.source == ResponseSource::Cache)));
        assert_eq!(manager.network().calls(), 0);
    }

    #[tokio::test]
    async fn respond_returns_response_only() {
        let manager = AssetCacheManager::new(MemoryStorage::new(), site());
        manager.install().await.unwrap();
        let response = manager.respond(&Request::get("/")).await.unwrap();
        assert_eq!(response.body, "<html>home</html>");
    }

    #[test]
    fn response_source_labels() {
        assert_eq!(ResponseSource::Cache.to_string(), "cache");
        assert_eq!(ResponseSource::Network.as_str(), "network");
        assert_eq!(ResponseSource::Fallback.as_str(), "fallback");
    }

    #[test]
    fn manager_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AssetCacheManager>();
        assert_send_sync::<AssetCacheManager<MemoryStorage, MockNetwork>>();
    }
}
