//! Remote data access with local fallback.
//!
//! `RemoteGateway` reads from the API first and falls back to the local
//! store when the network fails; writes go to the network only.

pub mod client;
pub mod error;

pub use client::{RemoteGateway, ResourceFilter, ResourceKind};
pub use error::GatewayError;
