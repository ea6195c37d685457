//! Local structured store for offline reads.
//!
//! This module provides `LocalStore`, a versioned key-addressed database
//! that mirrors server records, and `Mirror`, which performs those mirror
//! writes in the background. Collections:
//! - `restaurants`, keyed by `id`, indexed on `createdAt`
//! - `reviews`, keyed by `id`, indexed on `createdAt`

pub mod database;
pub mod error;
pub mod mirror;
pub mod schema;

pub use database::LocalStore;
pub use error::StoreError;
pub use mirror::Mirror;
pub use schema::{
    restaurant_schema, Upgrade, CREATED_AT_INDEX, DEFAULT_DB_NAME, DEFAULT_DB_VERSION,
    RESTAURANTS, REVIEWS,
};
