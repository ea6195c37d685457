//! Field decoders for values the server stores loosely typed.
//!
//! The API keeps flags as the text "true"/"false", photographs as bare
//! numbers and ratings as either numbers or numeric text. Each decoder reads
//! the raw JSON value and maps it onto the model's type.

use serde::{de::Error, Deserialize, Deserializer};
use serde_json::Value;

use super::MAX_RATING;

/// Clamp a rating into `0..=MAX_RATING`; anything outside becomes 0.
pub(crate) fn clamp_rating(rating: i64) -> u8 {
    u8::try_from(rating)
        .ok()
        .filter(|r| *r <= MAX_RATING)
        .unwrap_or(0)
}

/// `true`/`false` as booleans or text. Null and empty text are `false`.
pub(crate) fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(D::Error::custom(format!("not a flag: '{}'", other))),
        },
        other => Err(D::Error::custom(format!("not a flag: {}", other))),
    }
}

/// Text or a number rendered as text. Null and empty text are `None`.
pub(crate) fn text_or_number<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) if s.is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(D::Error::custom(format!("expected text or a number, got {}", other))),
    }
}

/// Star rating from a number or numeric text. Null and out-of-range values
/// are 0; non-numeric text is an error.
pub(crate) fn rating<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let value = Value::deserialize(deserializer)?;
    let number = match value {
        Value::Null => return Ok(0),
        Value::Number(ref n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Value::String(ref s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match number {
        Some(n) => Ok(clamp_rating(n)),
        None => Err(D::Error::custom(format!("not a rating: {}", value))),
    }
}
