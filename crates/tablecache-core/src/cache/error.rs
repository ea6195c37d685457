use thiserror::Error;

use crate::net::FetchError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Install failed fetching {url}: {source}")]
    InstallFailure {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("Invalid cache name: '{0}'")]
    InvalidName(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache index error: {0}")]
    Json(#[from] serde_json::Error),
}
