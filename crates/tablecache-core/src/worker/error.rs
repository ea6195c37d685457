use thiserror::Error;

use super::WorkerState;
use crate::cache::CacheError;
use crate::net::FetchError;
use crate::store::StoreError;

/// Failure answering one intercepted request.
#[derive(Error, Debug)]
pub enum InterceptError {
    #[error("Request failed: {0}")]
    Network(#[from] FetchError),

    #[error("App shell document is not cached")]
    ShellNotCached,
}

impl From<InterceptError> for FetchError {
    fn from(err: InterceptError) -> Self {
        match err {
            InterceptError::Network(e) => e,
            InterceptError::ShellNotCached => {
                FetchError::Unreachable("app shell document is not cached".to_string())
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Install failed: {0}")]
    Install(#[source] CacheError),

    #[error("Activation failed: {0}")]
    Activate(#[source] CacheError),

    #[error("Worker is {actual:?}, expected {expected:?}")]
    InvalidState {
        actual: WorkerState,
        expected: WorkerState,
    },

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
