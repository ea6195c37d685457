use thiserror::Error;

use crate::net::FetchError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// A write failed on the network; nothing local changed.
    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    /// A read failed on the network and the local store had nothing.
    #[error("Offline and no local copy: {source}")]
    Unavailable {
        #[source]
        source: FetchError,
    },

    #[error("Invalid data: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid API base URL: {0}")]
    InvalidBase(String),
}

impl GatewayError {
    /// Whether this is a network failure, on either path.
    pub fn is_network(&self) -> bool {
        matches!(self, GatewayError::Network(_) | GatewayError::Unavailable { .. })
    }
}
