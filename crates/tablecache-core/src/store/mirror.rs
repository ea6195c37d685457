use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::LocalStore;
use crate::models::{Record, RecordId};

/// Background writes of network results into the local store.
///
/// The caller never waits for a mirror write; `settle` exists for shutdown
/// and for callers that need to observe the mirrored copy.
///
/// Every write rewrites the whole database document, so each spawned
/// write costs time proportional to the store size. Readers queue behind
/// it on the store lock while the file is written off the runtime thread.
#[derive(Clone)]
pub struct Mirror {
    store: LocalStore,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Mirror {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    pub fn spawn_upsert(&self, collection: &str, records: Vec<Record>) {
        if records.is_empty() || !self.store.is_available() {
            return;
        }
        let store = self.store.clone();
        let collection = collection.to_string();
        let handle = tokio::spawn(async move {
            match store.upsert_many(&collection, records).await {
                Ok(count) => debug!(collection = %collection, count, "Mirrored records"),
                Err(e) => warn!(collection = %collection, error = %e, "Failed to mirror records"),
            }
        });
        self.track(handle);
    }

    pub fn spawn_delete(&self, collection: &str, id: RecordId) {
        if !self.store.is_available() {
            return;
        }
        let store = self.store.clone();
        let collection = collection.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = store.delete(&collection, &id).await {
                warn!(collection = %collection, %id, error = %e, "Failed to mirror delete");
            }
        });
        self.track(handle);
    }

    /// Wait until every mirror write spawned so far has finished.
    pub async fn settle(&self) {
        loop {
            let handles = {
                let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
                std::mem::take(&mut *pending)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Mirror task panicked");
                }
            }
        }
    }
}
