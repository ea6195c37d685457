//! The local structured store.
//!
//! One JSON document per database holds every collection. The document is
//! rewritten through a temporary file and a rename, so a crash never leaves
//! a half-written database behind. In memory the state sits behind a tokio
//! `RwLock`; a write transaction applies to memory first, keeps an undo log,
//! and rolls back if the document cannot be persisted.
//!
//! Records are stored under one spelling per field; see
//! `Record::canonicalize`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::schema::{Collection, Entry, Upgrade};
use super::StoreError;
use crate::models::{Record, RecordId};

const DB_FILE_SUFFIX: &str = ".db.json";

#[derive(Debug, Serialize, Deserialize)]
struct DatabaseFile {
    name: String,
    version: u32,
    next_seq: u64,
    collections: Vec<CollectionFile>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    name: String,
    key_path: String,
    #[serde(default)]
    indexes: BTreeMap<String, String>,
    #[serde(default)]
    records: Vec<Entry>,
}

// Borrowed mirror of `DatabaseFile` so persisting never clones records.
#[derive(Serialize)]
struct DatabaseFileRef<'a> {
    name: &'a str,
    version: u32,
    next_seq: u64,
    collections: Vec<CollectionFileRef<'a>>,
}

#[derive(Serialize)]
struct CollectionFileRef<'a> {
    name: &'a str,
    key_path: &'a str,
    indexes: &'a BTreeMap<String, String>,
    records: Vec<&'a Entry>,
}

#[derive(Debug, Default)]
struct DatabaseState {
    version: u32,
    next_seq: u64,
    collections: BTreeMap<String, Collection>,
}

impl DatabaseState {
    fn from_file(file: DatabaseFile) -> Result<Self, StoreError> {
        let mut collections = BTreeMap::new();
        for col in file.collections {
            let mut records = BTreeMap::new();
            for mut entry in col.records {
                entry.value.canonicalize();
                let key = entry.value.key(&col.key_path).ok_or_else(|| {
                    StoreError::Corrupt(format!("record without key in '{}'", col.name))
                })?;
                records.insert(key, entry);
            }
            collections.insert(
                col.name,
                Collection {
                    key_path: col.key_path,
                    indexes: col.indexes,
                    records,
                },
            );
        }
        Ok(Self {
            version: file.version,
            next_seq: file.next_seq,
            collections,
        })
    }

    fn collection(&self, name: &str) -> Result<&Collection, StoreError> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
    }
}

struct Database {
    name: String,
    path: PathBuf,
    state: RwLock<DatabaseState>,
}

impl Database {
    /// Serialize under the caller's guard, then hand the file write to the
    /// blocking pool so the runtime thread is never stalled on disk.
    async fn persist(&self, state: &DatabaseState) -> Result<(), StoreError> {
        write_document(&self.path, &self.name, state).await
    }
}

async fn write_document(path: &Path, name: &str, state: &DatabaseState) -> Result<(), StoreError> {
    let contents = encode_document(name, state)?;
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || write_bytes(&path, &contents))
        .await
        .map_err(|e| StoreError::Io(std::io::Error::other(e)))?
}

fn encode_document(name: &str, state: &DatabaseState) -> Result<Vec<u8>, StoreError> {
    let document = DatabaseFileRef {
        name,
        version: state.version,
        next_seq: state.next_seq,
        collections: state
            .collections
            .iter()
            .map(|(col_name, col)| CollectionFileRef {
                name: col_name,
                key_path: &col.key_path,
                indexes: &col.indexes,
                records: col.records.values().collect(),
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&document)?)
}

fn write_bytes(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn database_path(dir: &Path, name: &str) -> Result<PathBuf, StoreError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(StoreError::Unavailable(format!(
            "invalid database name '{}'",
            name
        )));
    }
    Ok(dir.join(format!("{}{}", name, DB_FILE_SUFFIX)))
}

/// Order two index values: numbers before strings, numbers numerically,
/// strings lexicographically.
fn compare_index_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::Number(_), Value::String(_)) => Ordering::Less,
        (Value::String(_), Value::Number(_)) => Ordering::Greater,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Handle to the local structured store.
///
/// Clone is cheap; every clone shares the same database. A handle built by
/// `unavailable()` (or degraded by `open_or_unavailable`) answers every read
/// with an empty result and ignores every write.
#[derive(Clone)]
pub struct LocalStore {
    db: Option<Arc<Database>>,
}

impl LocalStore {
    /// Open `name` under `dir`, creating it if absent. When `version` is
    /// above the stored version, `migrate` runs against the stored layout
    /// and the result is persisted at the new version; a failing migration
    /// leaves the stored database untouched.
    pub async fn open<F>(
        dir: &Path,
        name: &str,
        version: u32,
        migrate: F,
    ) -> Result<Self, StoreError>
    where
        F: Fn(&mut Upgrade<'_>) -> Result<(), StoreError>,
    {
        if version == 0 {
            return Err(StoreError::InvalidVersion(version));
        }
        let path = database_path(dir, name)?;
        std::fs::create_dir_all(dir).map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let mut state = if path.exists() {
            let contents = std::fs::read(&path).map_err(|e| {
                StoreError::Unavailable(format!("cannot read {}: {}", path.display(), e))
            })?;
            let file: DatabaseFile = serde_json::from_slice(&contents)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?;
            DatabaseState::from_file(file)?
        } else {
            DatabaseState::default()
        };

        if version < state.version {
            return Err(StoreError::VersionTooLow {
                stored: state.version,
                requested: version,
            });
        }

        if version > state.version {
            let mut collections = state.collections.clone();
            let mut upgrade = Upgrade::new(state.version, version, &mut collections);
            migrate(&mut upgrade)?;

            info!(
                database = name,
                from = state.version,
                to = version,
                "Upgrading local store"
            );
            state.collections = collections;
            state.version = version;
            write_document(&path, name, &state).await.map_err(|e| {
                StoreError::Unavailable(format!("cannot write {}: {}", path.display(), e))
            })?;
        }

        debug!(database = name, version, "Local store open");
        Ok(Self {
            db: Some(Arc::new(Database {
                name: name.to_string(),
                path,
                state: RwLock::new(state),
            })),
        })
    }

    /// A store that holds nothing and accepts nothing.
    pub fn unavailable() -> Self {
        Self { db: None }
    }

    /// Open, degrading to `unavailable()` on any failure.
    pub async fn open_or_unavailable<F>(dir: &Path, name: &str, version: u32, migrate: F) -> Self
    where
        F: Fn(&mut Upgrade<'_>) -> Result<(), StoreError>,
    {
        match Self::open(dir, name, version, migrate).await {
            Ok(store) => store,
            Err(e) => {
                warn!(database = name, error = %e, "Local store unavailable, continuing network-only");
                Self::unavailable()
            }
        }
    }

    /// Open, recreating the database from scratch when the stored copy is
    /// newer than `version` or unreadable. Any other failure degrades to
    /// `unavailable()`.
    pub async fn open_or_recover<F>(dir: &Path, name: &str, version: u32, migrate: F) -> Self
    where
        F: Fn(&mut Upgrade<'_>) -> Result<(), StoreError>,
    {
        match Self::open(dir, name, version, &migrate).await {
            Ok(store) => store,
            Err(e) if e.is_incompatible() => {
                warn!(database = name, error = %e, "Incompatible local store, recreating");
                if let Err(e) = Self::delete_database(dir, name) {
                    warn!(database = name, error = %e, "Failed to delete incompatible store");
                    return Self::unavailable();
                }
                Self::open_or_unavailable(dir, name, version, &migrate).await
            }
            Err(e) => {
                warn!(database = name, error = %e, "Local store unavailable, continuing network-only");
                Self::unavailable()
            }
        }
    }

    /// Irreversibly remove a database. Returns whether anything was deleted.
    /// Handles still open on it keep serving their in-memory copy until dropped.
    pub fn delete_database(dir: &Path, name: &str) -> Result<bool, StoreError> {
        let path = database_path(dir, name)?;
        let tmp = path.with_extension("json.tmp");
        if tmp.exists() {
            std::fs::remove_file(&tmp)?;
        }
        if path.exists() {
            std::fs::remove_file(&path)?;
            info!(database = name, "Local store deleted");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn is_available(&self) -> bool {
        self.db.is_some()
    }

    pub fn name(&self) -> Option<&str> {
        self.db.as_ref().map(|db| db.name.as_str())
    }

    pub async fn version(&self) -> Option<u32> {
        match self.db {
            Some(ref db) => Some(db.state.read().await.version),
            None => None,
        }
    }

    pub async fn collection_names(&self) -> Vec<String> {
        match self.db {
            Some(ref db) => db.state.read().await.collections.keys().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn upsert(&self, collection: &str, record: Record) -> Result<(), StoreError> {
        self.upsert_many(collection, vec![record]).await.map(|_| ())
    }

    /// Insert-or-merge every record by key in one transaction. Either the
    /// whole batch lands and is persisted, or nothing changes.
    pub async fn upsert_many(
        &self,
        collection: &str,
        records: Vec<Record>,
    ) -> Result<usize, StoreError> {
        let Some(ref db) = self.db else {
            debug!(collection, "Store unavailable, dropping upsert");
            return Ok(0);
        };
        if records.is_empty() {
            return Ok(0);
        }

        let mut guard = db.state.write().await;
        let state = &mut *guard;
        let first_seq = state.next_seq;
        let col = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;

        let keyed = records
            .into_iter()
            .map(|mut record| {
                record.canonicalize();
                record
                    .key(&col.key_path)
                    .map(|key| (key, record))
                    .ok_or_else(|| StoreError::MissingKey {
                        collection: collection.to_string(),
                        key_path: col.key_path.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let count = keyed.len();
        let mut undo: Vec<(RecordId, Option<Entry>)> = Vec::with_capacity(count);
        for (key, record) in keyed {
            match col.records.get_mut(&key) {
                Some(entry) => {
                    undo.push((key, Some(entry.clone())));
                    entry.value.merge(record);
                }
                None => {
                    let seq = state.next_seq;
                    state.next_seq += 1;
                    col.records.insert(key.clone(), Entry { seq, value: record });
                    undo.push((key, None));
                }
            }
        }

        if let Err(e) = db.persist(state).await {
            let col = state
                .collections
                .get_mut(collection)
                .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
            for (key, previous) in undo.into_iter().rev() {
                match previous {
                    Some(entry) => {
                        col.records.insert(key, entry);
                    }
                    None => {
                        col.records.remove(&key);
                    }
                }
            }
            state.next_seq = first_seq;
            warn!(collection, error = %e, "Upsert rolled back");
            return Err(e);
        }

        debug!(collection, count, "Upserted records");
        Ok(count)
    }

    /// Every record in key order. Empty when the store is unavailable.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Record>, StoreError> {
        let Some(ref db) = self.db else {
            return Ok(Vec::new());
        };
        let state = db.state.read().await;
        let col = state.collection(collection)?;
        Ok(col.records.values().map(|e| e.value.clone()).collect())
    }

    /// Records carrying the indexed field, ascending by its value; equal
    /// values keep insertion order.
    pub async fn get_all_by_index(
        &self,
        collection: &str,
        index: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let Some(ref db) = self.db else {
            return Ok(Vec::new());
        };
        let state = db.state.read().await;
        let col = state.collection(collection)?;
        let field = col
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex {
                collection: collection.to_string(),
                index: index.to_string(),
            })?;

        let mut indexed: Vec<(&Value, &Entry)> = col
            .records
            .values()
            .filter_map(|entry| match entry.value.get(field) {
                Some(v @ (Value::Number(_) | Value::String(_))) => Some((v, entry)),
                _ => None,
            })
            .collect();
        indexed.sort_by(|(va, ea), (vb, eb)| {
            compare_index_values(va, vb).then(ea.seq.cmp(&eb.seq))
        });
        Ok(indexed.into_iter().map(|(_, e)| e.value.clone()).collect())
    }

    pub async fn get_by_id(
        &self,
        collection: &str,
        id: &RecordId,
    ) -> Result<Option<Record>, StoreError> {
        let Some(ref db) = self.db else {
            return Ok(None);
        };
        let state = db.state.read().await;
        let col = state.collection(collection)?;
        Ok(col.records.get(id).map(|e| e.value.clone()))
    }

    pub async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let Some(ref db) = self.db else {
            return Ok(0);
        };
        let state = db.state.read().await;
        Ok(state.collection(collection)?.records.len())
    }

    /// Remove one record. Returns whether it existed.
    pub async fn delete(&self, collection: &str, id: &RecordId) -> Result<bool, StoreError> {
        let Some(ref db) = self.db else {
            return Ok(false);
        };
        let mut guard = db.state.write().await;
        let state = &mut *guard;
        let col = state
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        let Some(removed) = col.records.remove(id) else {
            return Ok(false);
        };

        if let Err(e) = db.persist(state).await {
            if let Some(col) = state.collections.get_mut(collection) {
                col.records.insert(id.clone(), removed);
            }
            warn!(collection, %id, error = %e, "Delete rolled back");
            return Err(e);
        }
        debug!(collection, %id, "Deleted record");
        Ok(true)
    }
}
