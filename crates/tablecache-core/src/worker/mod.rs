//! The offline worker: lifecycle management of the shell cache and the
//! per-request interception policy.

pub mod error;
pub mod lifecycle;
pub mod policy;

pub use error::{InterceptError, WorkerError};
pub use lifecycle::{OfflineWorker, WorkerMessage, WorkerState, DEFAULT_PRECACHE};
pub use policy::{FetchPolicy, Route};
