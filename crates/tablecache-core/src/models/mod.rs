//! Data models for the restaurant directory.
//!
//! - `Record`, `RecordId`: untyped JSON objects as mirrored by the local store
//! - `Restaurant`: directory entries with favorite flag and opening hours
//! - `Review`, `NewReview`: user reviews and review submissions

mod lenient;
pub mod record;
pub mod restaurant;
pub mod review;

pub use record::{Record, RecordId, ID_FIELD};
pub use restaurant::{LatLng, Restaurant, Timestamp};
pub use review::{NewReview, Review, ReviewSubmission, MAX_RATING};
