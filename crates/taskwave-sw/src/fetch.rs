//! Fetch interception: stale-while-revalidate with offline fallback,
//! plus FIFO trimming of the dynamic generation.
//!
//! The interceptor never blocks a cached response on the network leg:
//! the cache wins the race for responding, the network wins the race for
//! freshness. Background revalidation is surfaced as a join handle on the
//! decision, the explicit analogue of `event.waitUntil(...)`.

use std::sync::Arc;

use futures::future::BoxFuture;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

use crate::cache::{Cache, CacheEntry, CacheStorage, ResponseKind};
use crate::{ServiceWorkerError, SwConfig};

// ==================== Request / Response ====================

/// An intercepted network request.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Request method.
    pub method: String,

    /// Absolute request URL.
    pub url: Url,

    /// Request headers.
    pub headers: HashMap<String, String>,
}

impl FetchRequest {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
            headers: HashMap::new(),
        }
    }

    /// Create a request with an explicit method.
    pub fn with_method(method: &str, url: Url) -> Self {
        Self {
            method: method.to_uppercase(),
            url,
            headers: HashMap::new(),
        }
    }

    /// Attach a header.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Look up a header, case-insensitively.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a document navigation (`Accept` includes text/html).
    pub fn accepts_html(&self) -> bool {
        self.get_header("accept")
            .map(|v| v.contains("text/html"))
            .unwrap_or(false)
    }
}

/// A response delivered to the intercepted caller.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Status code.
    pub status: u16,

    /// Response headers.
    pub headers: HashMap<String, String>,

    /// Response body.
    pub body: Vec<u8>,

    /// Response type.
    pub kind: ResponseKind,

    /// Whether served from cache.
    pub from_cache: bool,
}

impl FetchResponse {
    /// A successful same-origin response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body,
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// Create a response from a cache entry.
    pub fn from_entry(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            headers: entry.headers.clone(),
            body: entry.body.clone(),
            kind: entry.kind,
            from_cache: true,
        }
    }

    /// Synthetic response for a request that matched neither cache nor
    /// network. Fail-loud for non-navigational assets.
    pub fn request_timeout() -> Self {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "text/plain".to_string());
        Self {
            status: 408,
            headers,
            body: b"Network unreachable and no cached copy available".to_vec(),
            kind: ResponseKind::Basic,
            from_cache: false,
        }
    }

    /// Snapshot this response into a cache entry.
    pub fn to_entry(&self, url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_string(),
            method: "GET".to_string(),
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            kind: self.kind,
            stored_at: taskwave_common::epoch_ms(),
        }
    }

    /// Only 200 same-origin responses may enter the cache.
    pub fn is_storable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

// ==================== Network backend ====================

/// The real network, behind a seam so scripted backends can stand in.
pub trait NetworkBackend: Send + Sync {
    /// Issue the request against the network.
    fn fetch(&self, request: FetchRequest)
        -> BoxFuture<'static, Result<FetchResponse, ServiceWorkerError>>;
}

// ==================== Interception ====================

/// Outcome of intercepting one request.
#[derive(Debug)]
pub enum FetchDecision {
    /// Not eligible for caching; default network handling applies.
    Bypass,
    /// Respond with this, keeping the worker alive until `revalidation`
    /// (if any) settles.
    Respond {
        response: FetchResponse,
        revalidation: Option<JoinHandle<()>>,
    },
}

impl FetchDecision {
    /// The response, if this decision carries one.
    pub fn response(&self) -> Option<&FetchResponse> {
        match self {
            Self::Bypass => None,
            Self::Respond { response, .. } => Some(response),
        }
    }
}

/// Requests the interceptor must leave untouched: API traffic, anything
/// carrying a query string, and non-GET methods.
pub fn should_bypass(config: &SwConfig, request: &FetchRequest) -> bool {
    request.method != "GET"
        || request.url.query().is_some()
        || request.url.path().contains(&config.api_segment)
}

/// Apply the stale-while-revalidate policy to one intercepted request.
pub async fn handle_fetch(
    config: &SwConfig,
    caches: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn NetworkBackend>,
    request: FetchRequest,
) -> FetchDecision {
    if should_bypass(config, &request) {
        trace!(url = %request.url, method = %request.method, "bypass");
        return FetchDecision::Bypass;
    }

    let cached = caches
        .read()
        .await
        .match_request(request.url.as_str())
        .cloned();

    if let Some(entry) = cached {
        trace!(url = %request.url, "cache hit, revalidating in background");
        let revalidation = tokio::spawn(revalidate(
            config.clone(),
            caches,
            network,
            request,
        ));
        return FetchDecision::Respond {
            response: FetchResponse::from_entry(&entry),
            revalidation: Some(revalidation),
        };
    }

    let response = match network.fetch(request.clone()).await {
        Ok(response) => {
            store_if_storable(config, &caches, &request, &response).await;
            response
        }
        Err(e) => {
            warn!(url = %request.url, error = %e, "network fetch failed");
            offline_fallback(config, &caches, &request).await
        }
    };

    FetchDecision::Respond {
        response,
        revalidation: None,
    }
}

/// Network leg of stale-while-revalidate. Failures stay local: the caller
/// already holds the cached response.
async fn revalidate(
    config: SwConfig,
    caches: Arc<RwLock<CacheStorage>>,
    network: Arc<dyn NetworkBackend>,
    request: FetchRequest,
) {
    match network.fetch(request.clone()).await {
        Ok(response) => store_if_storable(&config, &caches, &request, &response).await,
        Err(e) => debug!(url = %request.url, error = %e, "revalidation failed"),
    }
}

/// Write-through into the dynamic generation, then trim.
async fn store_if_storable(
    config: &SwConfig,
    caches: &Arc<RwLock<CacheStorage>>,
    request: &FetchRequest,
    response: &FetchResponse,
) {
    if !response.is_storable() {
        return;
    }

    let mut storage = caches.write().await;
    let max = config.dynamic_max_entries;
    let cache = storage.open(&config.dynamic_cache_name());
    cache.put(request.url.as_str(), response.to_entry(request.url.as_str()));
    debug!(url = %request.url, cache = %cache.name, "stored response");
    trim(cache, max);
}

/// Delete oldest-inserted entries until the count is within the ceiling.
///
/// This is FIFO by insertion order, not true LRU; the platform only hands
/// us key enumeration order cheaply. A delete that misses (raced away)
/// is ignored and the count is re-checked.
pub(crate) fn trim(cache: &mut Cache, max: usize) {
    while cache.len() > max {
        let Some(oldest) = cache.oldest_key().map(str::to_string) else {
            break;
        };
        if cache.delete(&oldest) {
            debug!(url = %oldest, cache = %cache.name, "evicted oldest entry");
        }
    }
}

/// Offline degradation: cached offline page for document navigations,
/// synthetic 408 for everything else.
async fn offline_fallback(
    config: &SwConfig,
    caches: &Arc<RwLock<CacheStorage>>,
    request: &FetchRequest,
) -> FetchResponse {
    if request.accepts_html() {
        if let Ok(offline_url) = config.resolve(&config.offline_page) {
            if let Some(entry) = caches.read().await.match_request(offline_url.as_str()) {
                debug!(url = %request.url, "serving offline fallback page");
                return FetchResponse::from_entry(entry);
            }
        }
    }
    FetchResponse::request_timeout()
}

// ==================== Test backends ====================

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Scripted in-memory network for tests.
    pub(crate) struct ScriptedNetwork {
        routes: Mutex<std::collections::HashMap<String, FetchResponse>>,
        offline: AtomicBool,
        requests: Mutex<Vec<String>>,
    }

    impl ScriptedNetwork {
        pub(crate) fn new() -> Self {
            Self {
                routes: Mutex::new(std::collections::HashMap::new()),
                offline: AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn route(&self, url: &str, response: FetchResponse) {
            self.routes.lock().unwrap().insert(url.to_string(), response);
        }

        pub(crate) fn set_offline(&self, offline: bool) {
            self.offline.store(offline, Ordering::SeqCst);
        }

        pub(crate) fn requests(&self) -> Vec<String> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl NetworkBackend for ScriptedNetwork {
        fn fetch(
            &self,
            request: FetchRequest,
        ) -> BoxFuture<'static, Result<FetchResponse, ServiceWorkerError>> {
            self.requests.lock().unwrap().push(request.url.to_string());
            let result = if self.offline.load(Ordering::SeqCst) {
                Err(ServiceWorkerError::NetworkError("offline".to_string()))
            } else {
                self.routes
                    .lock()
                    .unwrap()
                    .get(request.url.as_str())
                    .cloned()
                    .ok_or_else(|| ServiceWorkerError::NotFound(request.url.to_string()))
            };
            Box::pin(async move { result })
        }
    }
}
