//! Store layout and the additive upgrade surface handed to migrations.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::models::{Record, RecordId, ID_FIELD};

pub const RESTAURANTS: &str = "restaurants";
pub const REVIEWS: &str = "reviews";
pub const CREATED_AT_INDEX: &str = "createdAt";

pub const DEFAULT_DB_NAME: &str = "mws-restaurant";
pub const DEFAULT_DB_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct Entry {
    /// Insertion sequence, used to break index ties.
    pub seq: u64,
    pub value: Record,
}

#[derive(Debug, Clone)]
pub(crate) struct Collection {
    pub key_path: String,
    /// index name -> field the index reads
    pub indexes: BTreeMap<String, String>,
    pub records: BTreeMap<RecordId, Entry>,
}

impl Collection {
    pub fn new(key_path: &str) -> Self {
        Self {
            key_path: key_path.to_string(),
            indexes: BTreeMap::new(),
            records: BTreeMap::new(),
        }
    }
}

/// Handed to a migration while the database moves from `old_version` to
/// `new_version`. Only additive operations exist: collections and indexes
/// can be created, never dropped.
pub struct Upgrade<'a> {
    old_version: u32,
    new_version: u32,
    collections: &'a mut BTreeMap<String, Collection>,
}

impl<'a> Upgrade<'a> {
    pub(crate) fn new(
        old_version: u32,
        new_version: u32,
        collections: &'a mut BTreeMap<String, Collection>,
    ) -> Self {
        Self {
            old_version,
            new_version,
            collections,
        }
    }

    /// 0 when the database is being created.
    pub fn old_version(&self) -> u32 {
        self.old_version
    }

    pub fn new_version(&self) -> u32 {
        self.new_version
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.collections.contains_key(collection)
    }

    pub fn has_index(&self, collection: &str, index: &str) -> bool {
        self.collections
            .get(collection)
            .map(|c| c.indexes.contains_key(index))
            .unwrap_or(false)
    }

    pub fn create_collection(&mut self, name: &str, key_path: &str) -> Result<(), StoreError> {
        if self.contains(name) {
            return Err(StoreError::Migration(format!(
                "collection '{}' already exists",
                name
            )));
        }
        self.collections
            .insert(name.to_string(), Collection::new(key_path));
        Ok(())
    }

    pub fn create_index(
        &mut self,
        collection: &str,
        index: &str,
        key_path: &str,
    ) -> Result<(), StoreError> {
        let target = self
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::UnknownCollection(collection.to_string()))?;
        if target.indexes.contains_key(index) {
            return Err(StoreError::Migration(format!(
                "index '{}' already exists on '{}'",
                index, collection
            )));
        }
        target
            .indexes
            .insert(index.to_string(), key_path.to_string());
        Ok(())
    }
}

/// Migration for the restaurant directory: adds whichever of the two
/// collections and their `createdAt` indexes are missing.
pub fn restaurant_schema(upgrade: &mut Upgrade<'_>) -> Result<(), StoreError> {
    for name in [RESTAURANTS, REVIEWS] {
        if !upgrade.contains(name) {
            upgrade.create_collection(name, ID_FIELD)?;
        }
        if !upgrade.has_index(name, CREATED_AT_INDEX) {
            upgrade.create_index(name, CREATED_AT_INDEX, CREATED_AT_INDEX)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restaurant_schema_from_scratch() {
        let mut collections = BTreeMap::new();
        let mut upgrade = Upgrade::new(0, 2, &mut collections);
        restaurant_schema(&mut upgrade).unwrap();

        assert!(collections.contains_key(RESTAURANTS));
        assert!(collections.contains_key(REVIEWS));
        assert_eq!(
            collections[REVIEWS].indexes.get(CREATED_AT_INDEX),
            Some(&CREATED_AT_INDEX.to_string())
        );
    }

    #[test]
    fn test_restaurant_schema_only_adds_missing() {
        let mut collections = BTreeMap::new();
        collections.insert(RESTAURANTS.to_string(), Collection::new(ID_FIELD));
        let mut upgrade = Upgrade::new(1, 2, &mut collections);
        restaurant_schema(&mut upgrade).unwrap();

        assert!(collections[RESTAURANTS].indexes.contains_key(CREATED_AT_INDEX));
        assert!(collections.contains_key(REVIEWS));
    }

    #[test]
    fn test_create_collection_twice_is_rejected() {
        let mut collections = BTreeMap::new();
        let mut upgrade = Upgrade::new(0, 1, &mut collections);
        upgrade.create_collection("things", "id").unwrap();
        assert!(upgrade.create_collection("things", "id").is_err());
        assert!(upgrade.create_index("missing", "createdAt", "createdAt").is_err());
    }
}
