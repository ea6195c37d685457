use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{CacheError, CacheNames};
use crate::net::{Request, Response, Transport};

/// Index file inside every cache directory
const INDEX_FILE: &str = "index.json";

/// Extension of stored response bodies
const BODY_EXTENSION: &str = "body";

/// A stored response. The body lives in its own file on disk; the index
/// only carries the metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub url: String,
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    fn new(url: String, response: Response, cached_at: DateTime<Utc>) -> Self {
        Self {
            url,
            status: response.status.as_u16(),
            headers: response.headers,
            body: response.body,
            cached_at,
        }
    }

    pub fn to_response(&self) -> Response {
        Response {
            status: StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        let now = Utc::now();
        (now - self.cached_at).num_minutes()
    }
}

#[derive(Debug, Deserialize)]
struct CacheIndex {
    name: String,
    order: u64,
    #[serde(default)]
    entries: Vec<CachedResponse>,
}

#[derive(Serialize)]
struct CacheIndexRef<'a> {
    name: &'a str,
    order: u64,
    entries: Vec<&'a CachedResponse>,
}

#[derive(Debug, Clone)]
struct NamedCache {
    /// Creation order; lookups across caches go oldest first.
    order: u64,
    entries: BTreeMap<String, CachedResponse>,
}

#[derive(Debug, Default)]
struct CacheState {
    next_order: u64,
    caches: BTreeMap<String, NamedCache>,
}

impl CacheState {
    fn in_order(&self) -> Vec<(&String, &NamedCache)> {
        let mut caches: Vec<_> = self.caches.iter().collect();
        caches.sort_by_key(|(_, c)| c.order);
        caches
    }
}

struct Inner {
    root: Option<PathBuf>,
    state: RwLock<CacheState>,
}

fn validate_name(name: &str) -> Result<(), CacheError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidName(name.to_string()))
    }
}

fn body_path(dir: &Path, url: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    dir.join(format!("{}.{}", hex::encode(hasher.finalize()), BODY_EXTENSION))
}

impl Inner {
    fn cache_dir(&self, name: &str) -> Option<PathBuf> {
        self.root.as_ref().map(|root| root.join(name))
    }

    /// Write the bodies of `fresh`, then swap in the index. Until the index
    /// rename lands, readers of the directory still see the previous index.
    /// The index is serialized under the caller's guard; file writes run
    /// on the blocking pool.
    async fn persist(
        &self,
        name: &str,
        cache: &NamedCache,
        fresh: &[&CachedResponse],
    ) -> Result<(), CacheError> {
        let Some(dir) = self.cache_dir(name) else {
            return Ok(());
        };
        let index = serde_json::to_vec(&CacheIndexRef {
            name,
            order: cache.order,
            entries: cache.entries.values().collect(),
        })?;
        let bodies: Vec<(PathBuf, Vec<u8>)> = fresh
            .iter()
            .map(|entry| (body_path(&dir, &entry.url), entry.body.clone()))
            .collect();

        tokio::task::spawn_blocking(move || -> Result<(), CacheError> {
            std::fs::create_dir_all(&dir)?;
            for (path, body) in bodies {
                std::fs::write(path, body)?;
            }
            let tmp = dir.join(format!("{}.tmp", INDEX_FILE));
            std::fs::write(&tmp, index)?;
            std::fs::rename(&tmp, dir.join(INDEX_FILE))?;
            Ok(())
        })
        .await
        .map_err(|e| CacheError::Io(std::io::Error::other(e)))?
    }

    fn remove_dir(&self, name: &str) -> Result<(), CacheError> {
        if let Some(dir) = self.cache_dir(name) {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }
}

/// Named response caches keyed by request URL.
///
/// Clone is cheap; every clone shares the same caches.
#[derive(Clone)]
pub struct CacheSet {
    inner: Arc<Inner>,
}

impl CacheSet {
    /// Disk-backed cache set rooted at `root`, loading whatever caches a
    /// previous run left there.
    pub fn open(root: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(root)?;
        let mut state = CacheState::default();

        for dir_entry in std::fs::read_dir(root)? {
            let dir_entry = dir_entry?;
            if !dir_entry.file_type()?.is_dir() {
                continue;
            }
            let dir = dir_entry.path();
            let index_path = dir.join(INDEX_FILE);
            if !index_path.exists() {
                debug!(dir = %dir.display(), "Skipping cache directory without index");
                continue;
            }
            let index: CacheIndex = match std::fs::read(&index_path)
                .map_err(CacheError::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(CacheError::from))
            {
                Ok(index) => index,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Unreadable cache index, skipping");
                    continue;
                }
            };

            let mut entries = BTreeMap::new();
            for mut entry in index.entries {
                match std::fs::read(body_path(&dir, &entry.url)) {
                    Ok(body) => {
                        entry.body = body;
                        entries.insert(entry.url.clone(), entry);
                    }
                    Err(e) => warn!(url = %entry.url, error = %e, "Missing cached body, dropping entry"),
                }
            }
            state.next_order = state.next_order.max(index.order + 1);
            state.caches.insert(
                index.name,
                NamedCache {
                    order: index.order,
                    entries,
                },
            );
        }

        debug!(root = %root.display(), caches = state.caches.len(), "Cache set open");
        Ok(Self {
            inner: Arc::new(Inner {
                root: Some(root.to_path_buf()),
                state: RwLock::new(state),
            }),
        })
    }

    /// Cache set that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(Inner {
                root: None,
                state: RwLock::new(CacheState::default()),
            }),
        }
    }

    /// Cache names, oldest first.
    pub async fn keys(&self) -> Vec<String> {
        let state = self.inner.state.read().await;
        state
            .in_order()
            .into_iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub async fn has(&self, cache_name: &str) -> bool {
        self.inner.state.read().await.caches.contains_key(cache_name)
    }

    /// Delete a whole cache. Returns whether it existed.
    pub async fn delete(&self, cache_name: &str) -> Result<bool, CacheError> {
        let mut state = self.inner.state.write().await;
        if !state.caches.contains_key(cache_name) {
            return Ok(false);
        }
        self.inner.remove_dir(cache_name)?;
        state.caches.remove(cache_name);
        info!(cache = cache_name, "Cache deleted");
        Ok(true)
    }

    /// Seed `cache_name` with every URL in `urls`. Nothing is stored unless
    /// every fetch succeeded with an OK status.
    pub async fn install<T>(
        &self,
        transport: &T,
        cache_name: &str,
        urls: &[Url],
    ) -> Result<usize, CacheError>
    where
        T: Transport + ?Sized,
    {
        validate_name(cache_name)?;

        let fetches = urls.iter().map(|url| async move {
            let request = Request::get(url.clone());
            let response = transport
                .fetch(&request)
                .await
                .and_then(Response::error_for_status)
                .map_err(|source| CacheError::InstallFailure {
                    url: url.to_string(),
                    source,
                })?;
            Ok::<_, CacheError>((request.cache_key(), response))
        });
        let fetched = match futures::future::try_join_all(fetches).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!(cache = cache_name, error = %e, "Cache install failed");
                return Err(e);
            }
        };

        let count = fetched.len();
        self.commit(cache_name, fetched).await?;
        info!(cache = cache_name, count, "Cache seeded");
        Ok(count)
    }

    /// Delete every cache of ours that is not one of the current `names`.
    /// Returns the deleted names.
    pub async fn activate(&self, names: &CacheNames) -> Result<Vec<String>, CacheError> {
        let whitelist = names.whitelist();
        let mut state = self.inner.state.write().await;
        let stale: Vec<String> = state
            .caches
            .keys()
            .filter(|name| names.is_ours(name) && !whitelist.contains(name))
            .cloned()
            .collect();

        for name in &stale {
            self.inner.remove_dir(name)?;
            state.caches.remove(name);
            info!(cache = %name, "Evicted stale cache");
        }
        Ok(stale)
    }

    /// Look `request` up across every cache, oldest cache first.
    pub async fn match_request(&self, request: &Request) -> Option<CachedResponse> {
        let key = request.cache_key();
        let state = self.inner.state.read().await;
        state
            .in_order()
            .into_iter()
            .find_map(|(_, cache)| cache.entries.get(&key).cloned())
    }

    pub async fn match_in(&self, cache_name: &str, url: &str) -> Option<CachedResponse> {
        let state = self.inner.state.read().await;
        state
            .caches
            .get(cache_name)
            .and_then(|cache| cache.entries.get(url).cloned())
    }

    /// Store `response` under `request` in `cache_name`, creating the cache
    /// if needed. An existing entry for the same URL is replaced.
    pub async fn put(
        &self,
        cache_name: &str,
        request: &Request,
        response: Response,
    ) -> Result<(), CacheError> {
        validate_name(cache_name)?;
        self.commit(cache_name, vec![(request.cache_key(), response)])
            .await
    }

    async fn commit(
        &self,
        cache_name: &str,
        responses: Vec<(String, Response)>,
    ) -> Result<(), CacheError> {
        let mut state = self.inner.state.write().await;
        let created = !state.caches.contains_key(cache_name);
        let mut cache = match state.caches.get(cache_name) {
            Some(existing) => existing.clone(),
            None => NamedCache {
                order: state.next_order,
                entries: BTreeMap::new(),
            },
        };

        let now = Utc::now();
        let fresh: Vec<CachedResponse> = responses
            .into_iter()
            .map(|(url, response)| CachedResponse::new(url, response, now))
            .collect();
        for entry in &fresh {
            cache.entries.insert(entry.url.clone(), entry.clone());
        }

        let fresh_refs: Vec<&CachedResponse> = fresh.iter().collect();
        self.inner.persist(cache_name, &cache, &fresh_refs).await?;

        if created {
            state.next_order += 1;
        }
        state.caches.insert(cache_name.to_string(), cache);
        Ok(())
    }

    /// Remove every entry of `cache_name` whose URL fails `keep`.
    /// Returns how many entries were removed.
    pub async fn prune<F>(&self, cache_name: &str, keep: F) -> Result<usize, CacheError>
    where
        F: Fn(&str) -> bool,
    {
        let mut state = self.inner.state.write().await;
        let Some(existing) = state.caches.get(cache_name) else {
            return Ok(0);
        };

        let mut cache = existing.clone();
        let removed: Vec<String> = cache
            .entries
            .keys()
            .filter(|url| !keep(url.as_str()))
            .cloned()
            .collect();
        if removed.is_empty() {
            return Ok(0);
        }
        for url in &removed {
            cache.entries.remove(url);
        }

        self.inner.persist(cache_name, &cache, &[]).await?;
        if let Some(dir) = self.inner.cache_dir(cache_name) {
            for url in &removed {
                if let Err(e) = std::fs::remove_file(body_path(&dir, url)) {
                    debug!(url = %url, error = %e, "Could not remove pruned body");
                }
            }
        }
        state.caches.insert(cache_name.to_string(), cache);

        info!(cache = cache_name, removed = removed.len(), "Pruned cache");
        Ok(removed.len())
    }

    /// Every entry in `cache_name`, ordered by URL.
    pub async fn entries(&self, cache_name: &str) -> Vec<CachedResponse> {
        let state = self.inner.state.read().await;
        state
            .caches
            .get(cache_name)
            .map(|cache| cache.entries.values().cloned().collect())
            .unwrap_or_default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::mock::MockTransport;
    use chrono::Duration;
    use tempfile::tempdir;

    const ORIGIN: &str = "http://localhost:8000";

    fn url(path: &str) -> Url {
        Url::parse(ORIGIN).unwrap().join(path).unwrap()
    }

    fn ok(body: &str) -> Response {
        Response::new(StatusCode::OK, body.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_install_seeds_every_url() {
        let transport = MockTransport::new();
        transport.respond(url("/index.html").as_str(), StatusCode::OK, "<html>");
        transport.respond(url("/styles.css").as_str(), StatusCode::OK, "body{}");

        let caches = CacheSet::in_memory();
        let count = caches
            .install(
                &transport,
                "mws-restaurant-static-v1",
                &[url("/index.html"), url("/styles.css")],
            )
            .await
            .unwrap();

        assert_eq!(count, 2);
        let hit = caches
            .match_request(&Request::get(url("/styles.css")))
            .await
            .unwrap();
        assert_eq!(hit.body, b"body{}");
    }

    #[tokio::test]
    async fn test_install_is_atomic_on_missing_asset() {
        let transport = MockTransport::new();
        transport.respond(url("/index.html").as_str(), StatusCode::OK, "<html>");
        transport.respond(url("/styles.css").as_str(), StatusCode::OK, "body{}");
        transport.respond(url("/missing.png").as_str(), StatusCode::NOT_FOUND, "");

        let dir = tempdir().unwrap();
        let caches = CacheSet::open(dir.path()).unwrap();
        let result = caches
            .install(
                &transport,
                "mws-restaurant-static-v1",
                &[url("/index.html"), url("/styles.css"), url("/missing.png")],
            )
            .await;

        match result {
            Err(CacheError::InstallFailure { url: failed, .. }) => {
                assert!(failed.ends_with("/missing.png"))
            }
            other => panic!("expected install failure, got {:?}", other.map(|_| ())),
        }
        assert!(caches.keys().await.is_empty());
        assert!(caches
            .match_request(&Request::get(url("/index.html")))
            .await
            .is_none());

        let reopened = CacheSet::open(dir.path()).unwrap();
        assert!(reopened.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_install_fails_on_transport_error() {
        let transport = MockTransport::new();
        transport.respond(url("/index.html").as_str(), StatusCode::OK, "<html>");
        // "/app.js" has no route: the mock reports it unreachable

        let caches = CacheSet::in_memory();
        let result = caches
            .install(&transport, "shell", &[url("/index.html"), url("/app.js")])
            .await;
        assert!(matches!(result, Err(CacheError::InstallFailure { .. })));
        assert!(!caches.has("shell").await);
    }

    #[tokio::test]
    async fn test_activate_evicts_prefixed_caches_outside_whitelist() {
        let caches = CacheSet::in_memory();
        let req = Request::get(url("/a"));
        for name in [
            "mws-restaurant-static-v1",
            "mws-restaurant-static-v2",
            "mws-restaurant-content-imgs-v1",
            "other-app-v1",
        ] {
            caches.put(name, &req, ok("x")).await.unwrap();
        }

        let deleted = caches
            .activate(&CacheNames::new("mws-restaurant-", 2))
            .await
            .unwrap();

        assert_eq!(
            deleted,
            vec![
                "mws-restaurant-content-imgs-v1".to_string(),
                "mws-restaurant-static-v1".to_string()
            ]
        );
        assert!(caches.has("mws-restaurant-static-v2").await);
        assert!(caches.has("other-app-v1").await);
    }

    #[tokio::test]
    async fn test_activate_with_nothing_stale() {
        let caches = CacheSet::in_memory();
        let deleted = caches
            .activate(&CacheNames::default())
            .await
            .unwrap();
        assert!(deleted.is_empty());
    }

    #[tokio::test]
    async fn test_match_prefers_oldest_cache_and_misses_quietly() {
        let caches = CacheSet::in_memory();
        let req = Request::get(url("/logo.png"));
        caches.put("first", &req, ok("one")).await.unwrap();
        caches.put("second", &req, ok("two")).await.unwrap();

        assert_eq!(caches.match_request(&req).await.unwrap().body, b"one");
        assert_eq!(
            caches
                .match_in("second", req.url.as_str())
                .await
                .unwrap()
                .body,
            b"two"
        );
        assert!(caches
            .match_request(&Request::get(url("/nope")))
            .await
            .is_none());
        assert_eq!(caches.keys().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_entry() {
        let caches = CacheSet::in_memory();
        let req = Request::get(url("/app.js"));
        caches.put("shell", &req, ok("v1")).await.unwrap();
        caches.put("shell", &req, ok("v2")).await.unwrap();

        assert_eq!(caches.entries("shell").await.len(), 1);
        assert_eq!(caches.match_request(&req).await.unwrap().body, b"v2");
    }

    #[tokio::test]
    async fn test_prune_keeps_needed_entries() {
        let dir = tempdir().unwrap();
        let caches = CacheSet::open(dir.path()).unwrap();
        for path in ["/img/1.jpg", "/img/2.jpg", "/img/3.jpg"] {
            caches
                .put("imgs", &Request::get(url(path)), ok(path))
                .await
                .unwrap();
        }

        let removed = caches
            .prune("imgs", |u| !u.ends_with("/img/2.jpg"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(caches.entries("imgs").await.len(), 2);

        assert_eq!(caches.prune("missing", |_| false).await.unwrap(), 0);

        let reopened = CacheSet::open(dir.path()).unwrap();
        assert_eq!(reopened.entries("imgs").await.len(), 2);
    }

    #[tokio::test]
    async fn test_disk_cache_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let caches = CacheSet::open(dir.path()).unwrap();
            caches
                .put(
                    "mws-restaurant-static-v1",
                    &Request::get(url("/")),
                    ok("<html>shell</html>").with_header("Content-Type", "text/html"),
                )
                .await
                .unwrap();
            caches.put("later", &Request::get(url("/")), ok("x")).await.unwrap();
        }

        let caches = CacheSet::open(dir.path()).unwrap();
        let hit = caches.match_request(&Request::get(url("/"))).await.unwrap();
        assert_eq!(hit.body, b"<html>shell</html>");
        assert_eq!(hit.to_response().header("content-type"), Some("text/html"));

        assert!(caches.delete("later").await.unwrap());
        assert!(!caches.delete("later").await.unwrap());
        let reopened = CacheSet::open(dir.path()).unwrap();
        assert_eq!(reopened.keys().await, vec!["mws-restaurant-static-v1"]);
    }

    #[tokio::test]
    async fn test_invalid_cache_names_are_rejected() {
        let caches = CacheSet::in_memory();
        let req = Request::get(url("/"));
        for name in ["", "../escape", ".hidden", "has space"] {
            assert!(matches!(
                caches.put(name, &req, ok("x")).await,
                Err(CacheError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn test_age_minutes() {
        let mut cached = CachedResponse::new("http://localhost/".to_string(), ok("x"), Utc::now());
        assert_eq!(cached.age_minutes(), 0);

        cached.cached_at = Utc::now() - Duration::minutes(90);
        assert_eq!(cached.age_minutes(), 90);
    }
}
