//! Untyped records as persisted by the local store.
//!
//! The store mirrors whatever JSON objects the server hands out, so the
//! storage unit is a plain JSON object keyed by its `id` field. Typed views
//! (`Restaurant`, `Review`) are decoded from it on demand.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field every record is keyed by.
pub const ID_FIELD: &str = "id";

/// Alternate spellings the server and older clients use, with the spelling
/// records are stored under. `createdAt` stays camelCase since the store
/// indexes it by that name.
const FIELD_ALIASES: &[(&str, &str)] = &[
    ("isFavorite", "is_favorite"),
    ("restaurantId", "restaurant_id"),
    ("created_at", "createdAt"),
    ("updated_at", "updatedAt"),
];

/// Record identity. Integers sort before strings, mirroring how the
/// browser's structured store orders mixed keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Int(i64),
    Text(String),
}

impl RecordId {
    /// Parse an id as it appears in a URL or on the command line.
    /// Numeric strings become integer ids.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => RecordId::Int(n),
            Err(_) => RecordId::Text(trimmed.to_string()),
        }
    }

    /// Extract a key from a JSON value. Only integers and strings are valid keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RecordId::Int),
            Value::String(s) => Some(RecordId::Text(s.clone())),
            _ => None,
        }
    }

    /// Compare ids the way a foreign key written by hand would be compared:
    /// `7` and `"7"` refer to the same record.
    pub fn same_as(&self, other: &RecordId) -> bool {
        self.normalized() == other.normalized()
    }

    fn normalized(&self) -> RecordId {
        match self {
            RecordId::Text(s) => RecordId::parse(s),
            RecordId::Int(n) => RecordId::Int(*n),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

impl From<RecordId> for Value {
    fn from(id: RecordId) -> Self {
        match id {
            RecordId::Int(n) => Value::from(n),
            RecordId::Text(s) => Value::String(s),
        }
    }
}

/// A JSON object mirrored from the server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; anything other than an object is rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self::from(map)),
            _ => None,
        }
    }

    /// Rename aliased fields to their stored spelling. When both spellings
    /// are present the stored spelling wins and the alias is dropped.
    pub fn canonicalize(&mut self) {
        for (alias, canonical) in FIELD_ALIASES {
            if let Some(value) = self.0.remove(*alias) {
                if !self.0.contains_key(*canonical) {
                    self.0.insert(canonical.to_string(), value);
                }
            }
        }
    }

    /// Split a response payload into records. Arrays yield every object
    /// element, a single object yields itself, anything else yields nothing.
    pub fn list_from_payload(payload: Value) -> Vec<Self> {
        match payload {
            Value::Array(items) => items.into_iter().filter_map(Self::from_value).collect(),
            other => Self::from_value(other).into_iter().collect(),
        }
    }

    /// Serialize a typed model into a record.
    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        match serde_json::to_value(value)? {
            Value::Object(map) => Ok(Self(map)),
            other => Err(serde::ser::Error::custom(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }

    /// Decode into a typed model.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        let mut copy = self.clone();
        copy.canonicalize();
        T::deserialize(Value::Object(copy.0))
    }

    pub fn id(&self) -> Option<RecordId> {
        self.key(ID_FIELD)
    }

    pub fn key(&self, key_path: &str) -> Option<RecordId> {
        self.0.get(key_path).and_then(RecordId::from_value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.to_string(), value.into())
    }

    /// Builder-style `set`.
    pub fn with(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Partial merge: every field present in `incoming` overwrites ours,
    /// fields it does not mention are kept. Nested objects are replaced
    /// wholesale, not merged recursively.
    pub fn merge(&mut self, mut incoming: Record) {
        self.canonicalize();
        incoming.canonicalize();
        for (field, value) in incoming.0 {
            self.0.insert(field, value);
        }
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        let mut record = Self(map);
        record.canonicalize();
        record
    }
}
