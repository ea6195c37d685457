//! Offline data layer for the restaurant directory.
//!
//! This crate provides the pieces that keep the directory usable without a
//! network connection:
//! - `store`: versioned local store mirroring server records
//! - `cache`: named response caches seeded at install, evicted at activation
//! - `worker`: offline worker lifecycle and per-request fetch policy
//! - `gateway`: network-first API access with local fallback
//! - `config`: settings shared by every front end

pub mod cache;
pub mod config;
pub mod gateway;
pub mod models;
pub mod net;
pub mod store;
pub mod worker;

pub use cache::{CacheError, CacheNames, CacheSet, CachedResponse};
pub use config::Config;
pub use gateway::{GatewayError, RemoteGateway, ResourceFilter, ResourceKind};
pub use models::{NewReview, Record, RecordId, Restaurant, Review};
pub use net::{FetchError, HttpTransport, Request, Response, Transport};
pub use store::{LocalStore, Mirror, StoreError};
pub use worker::{FetchPolicy, InterceptError, OfflineWorker, WorkerError, WorkerMessage, WorkerState};
