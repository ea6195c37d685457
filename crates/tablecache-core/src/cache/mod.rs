//! Named response caches for the app shell and content images.
//!
//! This module provides the `CacheSet`, a set of named caches mapping
//! request URLs to stored responses. Caches are seeded atomically on
//! install, pruned on activation, and never refreshed on their own: an
//! entry changes only when the fetch policy stores a new response for it.

pub mod error;
pub mod names;
pub mod storage;

pub use error::CacheError;
pub use names::{CacheNames, DEFAULT_CACHE_PREFIX};
pub use storage::{CacheSet, CachedResponse};
