use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Structured storage unavailable: {0}")]
    Unavailable(String),

    #[error("Stored database is at version {stored}, cannot open at version {requested}")]
    VersionTooLow { stored: u32, requested: u32 },

    #[error("Database version must be at least 1, got {0}")]
    InvalidVersion(u32),

    #[error("Database file is corrupt: {0}")]
    Corrupt(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Unknown index {index} on collection {collection}")]
    UnknownIndex { collection: String, index: String },

    #[error("Record in {collection} has no valid key at '{key_path}'")]
    MissingKey { collection: String, key_path: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that `open_or_recover` answers by recreating the database.
    pub fn is_incompatible(&self) -> bool {
        matches!(self, StoreError::VersionTooLow { .. } | StoreError::Corrupt(_))
    }
}
