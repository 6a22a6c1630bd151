//! Cache buckets and cache storage.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures::future::try_join_all;
use hashbrown::HashMap;
use http::Method;
use pwa_net::{Fetcher, Request, Response};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::ServiceWorkerError;

/// Request identity used as the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: Method,
    /// URL with any fragment removed.
    pub url: String,
}

impl CacheKey {
    pub fn for_request(request: &Request) -> Self {
        Self::new(request.method.clone(), &request.url)
    }

    /// Key for a plain GET of `url`.
    pub fn get(url: &Url) -> Self {
        Self::new(Method::GET, url)
    }

    fn new(method: Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method,
            url: url.into(),
        }
    }
}

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub response: Response,
    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

/// A single named cache bucket.
#[derive(Debug, Default)]
pub struct Cache {
    /// Cache name.
    pub name: String,

    entries: HashMap<CacheKey, CacheEntry>,
}

impl Cache {
    /// Create a new cache.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Match a request. Only GET requests can hit.
    pub fn match_request(&self, request: &Request) -> Option<&CacheEntry> {
        if request.method != Method::GET {
            return None;
        }
        self.entries.get(&CacheKey::for_request(request))
    }

    /// Match a plain GET of `url`.
    pub fn match_url(&self, url: &Url) -> Option<&CacheEntry> {
        self.entries.get(&CacheKey::get(url))
    }

    /// Store a response for a request, replacing any previous entry.
    pub fn put(&mut self, request: &Request, response: Response) -> Result<(), ServiceWorkerError> {
        if request.method != Method::GET {
            return Err(ServiceWorkerError::CacheError(format!(
                "cannot cache {} request for {}",
                request.method, request.url
            )));
        }
        let key = CacheKey::for_request(request);
        let entry = CacheEntry {
            key: key.clone(),
            response,
            cached_at: now_millis(),
        };
        self.entries.insert(key, entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn served_from_cache(entry: &CacheEntry) -> Response {
    Response {
        from_cache: true,
        ..entry.response.clone()
    }
}

/// Cache storage (the `caches` global).
///
/// Clones share the same buckets; every operation takes the lock once, so a
/// put and a match never interleave.
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<HashMap<String, Cache>>>,
}

impl CacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a cache, creating it if it doesn't exist.
    pub async fn open(&self, name: &str) {
        let mut caches = self.caches.write().await;
        if !caches.contains_key(name) {
            debug!(cache = name, "Creating cache");
            caches.insert(name.to_string(), Cache::new(name));
        }
    }

    /// Check if cache exists.
    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Delete a cache.
    pub async fn delete(&self, name: &str) -> bool {
        self.caches.write().await.remove(name).is_some()
    }

    /// Get all cache names, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of entries in a cache, if it exists.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        self.caches.read().await.get(name).map(Cache::len)
    }

    /// Match a request in one named cache.
    pub async fn match_in(&self, name: &str, request: &Request) -> Option<Response> {
        let caches = self.caches.read().await;
        caches
            .get(name)?
            .match_request(request)
            .map(served_from_cache)
    }

    /// Match a plain GET of `url` in one named cache.
    pub async fn match_url_in(&self, name: &str, url: &Url) -> Option<Response> {
        let caches = self.caches.read().await;
        caches.get(name)?.match_url(url).map(served_from_cache)
    }

    /// Store a response in an open cache.
    ///
    /// A deleted cache stays deleted: writing to it fails with `NotFound`.
    pub async fn put(
        &self,
        name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), ServiceWorkerError> {
        let mut caches = self.caches.write().await;
        caches
            .get_mut(name)
            .ok_or_else(|| ServiceWorkerError::NotFound(format!("cache {name}")))?
            .put(request, response)
    }

    /// Fetch every request and store all responses, or store nothing.
    ///
    /// Fails if any fetch fails or comes back with a non-OK status.
    pub async fn add_all(
        &self,
        name: &str,
        requests: &[Request],
        fetcher: &dyn Fetcher,
    ) -> Result<(), ServiceWorkerError> {
        let responses = try_join_all(requests.iter().map(|request| async move {
            let response = fetcher.fetch(request).await?;
            if !response.ok() {
                warn!(url = %request.url, status = response.status, "Precache fetch not OK");
                return Err(ServiceWorkerError::CacheError(format!(
                    "{} returned status {}",
                    request.url, response.status
                )));
            }
            Ok::<_, ServiceWorkerError>(response)
        }))
        .await?;

        let mut caches = self.caches.write().await;
        let cache = caches
            .entry(name.to_string())
            .or_insert_with(|| Cache::new(name));
        for (request, response) in requests.iter().zip(responses) {
            cache.put(request, response)?;
        }

        info!(cache = name, count = requests.len(), "Cached resources");
        Ok(())
    }
}
