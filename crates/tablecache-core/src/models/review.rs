use serde::{Deserialize, Serialize};

use super::{lenient, RecordId, Timestamp};

/// Name recorded when a reviewer leaves the field blank.
const ANONYMOUS_REVIEWER: &str = "unnamed reviewer";

/// Highest star rating a review may carry.
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: RecordId,
    #[serde(alias = "restaurantId")]
    pub restaurant_id: RecordId,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::rating")]
    pub rating: u8,
    #[serde(default)]
    pub comments: String,
    #[serde(rename = "createdAt", alias = "created_at", default)]
    pub created_at: Option<Timestamp>,
    #[serde(rename = "updatedAt", alias = "updated_at", default)]
    pub updated_at: Option<Timestamp>,
}

impl Review {
    pub fn belongs_to(&self, restaurant_id: &RecordId) -> bool {
        self.restaurant_id.same_as(restaurant_id)
    }
}

/// A review as submitted by a user, before the server assigns an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewReview {
    pub restaurant_id: RecordId,
    pub name: Option<String>,
    pub rating: i64,
    pub comments: String,
}

/// The body posted to the reviews endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewSubmission {
    pub restaurant_id: RecordId,
    pub name: String,
    pub rating: u8,
    pub comments: String,
}

impl NewReview {
    /// Blank names become the anonymous reviewer, ratings outside 0..=5 become 0.
    pub fn normalized(&self) -> ReviewSubmission {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(ANONYMOUS_REVIEWER)
            .to_string();
        ReviewSubmission {
            restaurant_id: self.restaurant_id.clone(),
            name,
            rating: lenient::clamp_rating(self.rating),
            comments: self.comments.clone(),
        }
    }
}
