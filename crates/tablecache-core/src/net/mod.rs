//! Network access for the offline layer.
//!
//! Everything that talks to the origin server or the API goes through the
//! `Transport` trait; `HttpTransport` is the `reqwest` implementation.

pub mod error;
pub mod http;
#[cfg(test)]
pub(crate) mod mock;
pub mod transport;

pub use error::FetchError;
pub use http::{Request, RequestMode, Response};
pub use transport::{HttpTransport, Transport};
