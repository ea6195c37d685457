//! Offline worker lifecycle: install (seed the shell cache), activate
//! (evict stale caches), then control requests through `FetchPolicy`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use super::{FetchPolicy, InterceptError, WorkerError};
use crate::cache::CacheSet;
use crate::models::Restaurant;
use crate::net::{FetchError, Request, Response, Transport};
use crate::store::{LocalStore, Mirror, RESTAURANTS};

/// App-shell paths seeded into the static cache at install.
pub const DEFAULT_PRECACHE: &[&str] = &[
    "/",
    "/index.html",
    "/restaurant.html",
    "/dist/css/styles.css",
    "/dist/js/dbhelper.js",
    "/dist/js/main.js",
    "/dist/js/restaurant_info.js",
    "/dist/img/1.webp",
    "/dist/img/2.webp",
    "/dist/img/3.webp",
    "/dist/img/4.webp",
    "/dist/img/5.webp",
    "/dist/img/6.webp",
    "/dist/img/7.webp",
    "/dist/img/8.webp",
    "/dist/img/9.webp",
    "/dist/img/10.webp",
    "/favicon.ico",
    "/dist/img/icons/icon-192.png",
    "/manifest.json",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Install failed; a later `install` may retry.
    Redundant,
}

/// Messages the page may post to the worker, e.g. `{"action":"skipWaiting"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum WorkerMessage {
    SkipWaiting,
}

pub struct OfflineWorker<T> {
    policy: FetchPolicy,
    precache: Vec<Url>,
    transport: T,
    caches: CacheSet,
    mirror: Mirror,
    // Write-held for the whole of activation, so controlled requests wait
    // until eviction has finished.
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl<T: Transport> OfflineWorker<T> {
    /// Build a worker; `precache` paths are resolved against the app origin.
    pub fn new(
        policy: FetchPolicy,
        precache: &[String],
        transport: T,
        caches: CacheSet,
        mirror: Mirror,
    ) -> Result<Self, url::ParseError> {
        let precache = precache
            .iter()
            .map(|path| policy.origin().join(path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            policy,
            precache,
            transport,
            caches,
            mirror,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub fn policy(&self) -> &FetchPolicy {
        &self.policy
    }

    pub fn caches(&self) -> &CacheSet {
        &self.caches
    }

    pub fn mirror(&self) -> &Mirror {
        &self.mirror
    }

    pub fn store(&self) -> &LocalStore {
        self.mirror.store()
    }

    /// Seed the static cache with the app shell. Any failed resource
    /// fails the whole install and leaves the worker redundant.
    pub async fn install(&self) -> Result<usize, WorkerError> {
        {
            let mut state = self.state.write().await;
            match *state {
                WorkerState::Parsed | WorkerState::Redundant => *state = WorkerState::Installing,
                actual => {
                    return Err(WorkerError::InvalidState {
                        actual,
                        expected: WorkerState::Parsed,
                    })
                }
            }
        }

        let static_cache = self.policy.names().static_cache();
        let result = self
            .caches
            .install(&self.transport, &static_cache, &self.precache)
            .await;

        let count = {
            let mut state = self.state.write().await;
            match result {
                Ok(count) => {
                    *state = WorkerState::Installed;
                    count
                }
                Err(e) => {
                    *state = WorkerState::Redundant;
                    warn!(error = %e, "Worker install failed, worker is redundant");
                    return Err(WorkerError::Install(e));
                }
            }
        };
        info!(cache = %static_cache, count, "Worker installed");

        if self.skip_waiting.load(Ordering::SeqCst) {
            self.activate().await?;
        }
        Ok(count)
    }

    /// Evict every cache with our prefix that is not current. No
    /// controlled request is answered while this runs.
    pub async fn activate(&self) -> Result<Vec<String>, WorkerError> {
        if *self.state.read().await == WorkerState::Activated {
            return Ok(Vec::new());
        }

        let mut state = self.state.write().await;
        match *state {
            WorkerState::Installed => {}
            WorkerState::Activated => return Ok(Vec::new()),
            actual => {
                return Err(WorkerError::InvalidState {
                    actual,
                    expected: WorkerState::Installed,
                })
            }
        }
        *state = WorkerState::Activating;

        match self.caches.activate(self.policy.names()).await {
            Ok(evicted) => {
                *state = WorkerState::Activated;
                info!(evicted = evicted.len(), "Worker activated");
                Ok(evicted)
            }
            Err(e) => {
                *state = WorkerState::Installed;
                Err(WorkerError::Activate(e))
            }
        }
    }

    /// Handle a message from the page. `SkipWaiting` received before
    /// install finishes is remembered and applied once installed.
    pub async fn post_message(&self, message: WorkerMessage) -> Result<(), WorkerError> {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::SeqCst);
                if self.state().await == WorkerState::Installed {
                    self.activate().await?;
                }
            }
        }
        Ok(())
    }

    /// Every page controlled by the previous worker has closed.
    pub async fn clients_released(&self) -> Result<(), WorkerError> {
        if self.state().await == WorkerState::Installed {
            self.activate().await?;
        }
        Ok(())
    }

    /// Pick up a worker installed by an earlier run: if the current static
    /// cache exists, skip straight to activation. Returns whether it did.
    pub async fn resume(&self) -> Result<bool, WorkerError> {
        let static_cache = self.policy.names().static_cache();
        {
            let mut state = self.state.write().await;
            if *state != WorkerState::Parsed || !self.caches.has(&static_cache).await {
                return Ok(false);
            }
            *state = WorkerState::Installed;
        }
        self.activate().await?;
        Ok(true)
    }

    /// Answer a request made by a page. Before activation the worker does
    /// not control requests and they go straight to the network.
    pub async fn handle_fetch(&self, request: &Request) -> Result<Response, InterceptError> {
        let state = self.state.read().await;
        if *state != WorkerState::Activated {
            drop(state);
            debug!(url = %request.url, "Uncontrolled request");
            return Ok(self.transport.fetch(request).await?);
        }

        self.policy
            .respond(request, &self.transport, &self.caches, &self.mirror)
            .await
    }

    /// Remove cached images of restaurants that are no longer stored.
    /// Does nothing while the store is unavailable or empty.
    pub async fn prune_images(&self) -> Result<usize, WorkerError> {
        let store = self.mirror.store();
        if !store.is_available() {
            return Ok(0);
        }
        let restaurants = store.get_all(RESTAURANTS).await?;
        if restaurants.is_empty() {
            debug!("No stored restaurants, skipping image prune");
            return Ok(0);
        }

        let needed: HashSet<String> = restaurants
            .iter()
            .filter_map(|record| record.decode::<Restaurant>().ok())
            .flat_map(|restaurant| self.policy.image_urls(&restaurant))
            .collect();
        let image_cache = self.policy.names().image_cache();
        Ok(self
            .caches
            .prune(&image_cache, |url| needed.contains(url))
            .await?)
    }
}

// Pages see the worker as their transport.
#[async_trait]
impl<T: Transport> Transport for OfflineWorker<T> {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        Ok(self.handle_fetch(request).await?)
    }
}
