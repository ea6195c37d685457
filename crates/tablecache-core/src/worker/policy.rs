//! Per-request routing: which requests go to the network, which come from
//! the cache, and which are answered by the cached app shell.

use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::InterceptError;
use crate::cache::{CacheNames, CacheSet};
use crate::models::{Record, Restaurant};
use crate::net::{Request, RequestMode, Response, Transport};
use crate::store::{Mirror, RESTAURANTS, REVIEWS};

/// How one intercepted request is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// API request: network only, successful reads are mirrored locally.
    Data { collection: &'static str },
    /// Page navigation to the origin root, served from the shell cache.
    RootShell,
    /// Cache first, network fallback; a fetched response is stored in
    /// `store_in` when set.
    CacheFirst { store_in: Option<String> },
    /// Non-GET request outside the API: straight to the network.
    Network,
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

#[derive(Debug, Clone)]
pub struct FetchPolicy {
    origin: Url,
    api_base: Url,
    names: CacheNames,
    image_prefixes: Vec<String>,
    cache_on_fetch: bool,
}

impl FetchPolicy {
    pub fn new(origin: Url, api_base: Url, names: CacheNames) -> Self {
        Self {
            origin,
            api_base,
            names,
            image_prefixes: vec!["/img/".to_string(), "/dist/img/".to_string()],
            cache_on_fetch: true,
        }
    }

    /// Path prefixes (on the app origin) holding restaurant images.
    pub fn with_image_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.image_prefixes = prefixes;
        self
    }

    /// Whether cache misses fetched from the network are stored.
    pub fn with_cache_on_fetch(mut self, enabled: bool) -> Self {
        self.cache_on_fetch = enabled;
        self
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn api_base(&self) -> &Url {
        &self.api_base
    }

    /// Collection served by an API URL, if `url` is one.
    fn data_collection(&self, url: &Url) -> Option<&'static str> {
        if !same_origin(url, &self.api_base) {
            return None;
        }
        let base_path = self.api_base.path().trim_end_matches('/');
        let rest = url.path().strip_prefix(base_path)?;
        match rest.trim_start_matches('/').split('/').next() {
            Some("restaurants") => Some(RESTAURANTS),
            Some("reviews") => Some(REVIEWS),
            _ => None,
        }
    }

    fn is_image(&self, url: &Url) -> bool {
        same_origin(url, &self.origin)
            && self
                .image_prefixes
                .iter()
                .any(|prefix| url.path().starts_with(prefix.as_str()))
    }

    /// Classify a request. Branches are checked in order: API, navigation
    /// to the origin root, then everything else. A plain fetch of the root
    /// is an ordinary cache-first asset.
    pub fn classify(&self, request: &Request) -> Route {
        if let Some(collection) = self.data_collection(&request.url) {
            return Route::Data { collection };
        }
        if !request.is_get() {
            return Route::Network;
        }
        if request.mode == RequestMode::Navigate
            && same_origin(&request.url, &self.origin)
            && request.url.path() == "/"
        {
            return Route::RootShell;
        }

        let store_in = if !self.cache_on_fetch {
            None
        } else if self.is_image(&request.url) {
            Some(self.names.image_cache())
        } else if same_origin(&request.url, &self.origin) {
            Some(self.names.static_cache())
        } else {
            None
        };
        Route::CacheFirst { store_in }
    }

    /// Absolute image URLs the app shell may request for `restaurant`.
    pub fn image_urls(&self, restaurant: &Restaurant) -> Vec<String> {
        self.image_prefixes
            .iter()
            .flat_map(|prefix| restaurant.image_urls(prefix))
            .filter_map(|path| self.origin.join(&path).ok())
            .map(|url| url.to_string())
            .collect()
    }

    /// Answer `request` according to its route.
    pub async fn respond<T>(
        &self,
        request: &Request,
        transport: &T,
        caches: &CacheSet,
        mirror: &Mirror,
    ) -> Result<Response, InterceptError>
    where
        T: Transport + ?Sized,
    {
        let route = self.classify(request);
        debug!(url = %request.url, ?route, "Intercepted request");

        match route {
            Route::Data { collection } => {
                let response = transport.fetch(request).await?;
                if request.is_get() && response.ok() {
                    match response.json::<Value>() {
                        Ok(payload) => {
                            mirror.spawn_upsert(collection, Record::list_from_payload(payload))
                        }
                        Err(e) => debug!(url = %request.url, error = %e, "API response is not JSON, not mirrored"),
                    }
                }
                Ok(response)
            }
            Route::RootShell => {
                let root = Request::get(self.origin.clone());
                caches
                    .match_request(&root)
                    .await
                    .map(|cached| cached.to_response())
                    .ok_or(InterceptError::ShellNotCached)
            }
            Route::CacheFirst { store_in } => {
                if let Some(cached) = caches.match_request(request).await {
                    return Ok(cached.to_response());
                }
                let response = transport.fetch(request).await?;
                if let Some(cache_name) = store_in {
                    if response.ok() {
                        if let Err(e) = caches.put(&cache_name, request, response.clone()).await {
                            warn!(url = %request.url, cache = %cache_name, error = %e, "Failed to cache response");
                        }
                    }
                }
                Ok(response)
            }
            Route::Network => Ok(transport.fetch(request).await?),
        }
    }
}
