use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{lenient, RecordId};

/// Image formats the app shell ships for every restaurant photograph.
const IMAGE_EXTENSIONS: [&str; 2] = ["webp", "jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Server timestamps arrive either as epoch milliseconds or as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    Millis(i64),
    Text(String),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            Timestamp::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: RecordId,
    #[serde(default)]
    pub name: String,
    pub neighborhood: Option<String>,
    #[serde(default, deserialize_with = "lenient::text_or_number")]
    pub photograph: Option<String>,
    pub address: Option<String>,
    pub latlng: Option<LatLng>,
    pub cuisine_type: Option<String>,
    pub operating_hours: Option<BTreeMap<String, String>>,
    #[serde(rename = "createdAt", alias = "created_at", default)]
    pub created_at: Option<Timestamp>,
    #[serde(rename = "updatedAt", alias = "updated_at", default)]
    pub updated_at: Option<Timestamp>,
    // The server stores the flag as the text "true"/"false"
    #[serde(alias = "isFavorite", default, deserialize_with = "lenient::flag")]
    pub is_favorite: bool,
}

impl Restaurant {
    /// Detail page of this restaurant, relative to the app origin.
    pub fn page_url(&self) -> String {
        format!("./restaurant.html?id={}", self.id)
    }

    /// Every image URL the shell may request for this restaurant.
    /// Falls back to the id when no photograph is recorded.
    pub fn image_urls(&self, image_prefix: &str) -> Vec<String> {
        let stem = self
            .photograph
            .clone()
            .unwrap_or_else(|| self.id.to_string());
        IMAGE_EXTENSIONS
            .iter()
            .map(|ext| format!("{}{}.{}", image_prefix, stem, ext))
            .collect()
    }
}
