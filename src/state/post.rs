//! Post records and their identifiers

use crate::api::RawPost;
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Display layout of post timestamps in the output table
pub const POST_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A post identifier: a non-empty string of ASCII digits, ordered numerically
///
/// Identifiers routinely exceed `u64`, so they are kept as canonical decimal
/// strings (no leading zeros) and compared by length first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PostId(String);

impl PostId {
    /// Parses an identifier, stripping leading zeros
    ///
    /// Returns None for empty or non-numeric input.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let stripped = raw.trim_start_matches('0');
        if stripped.is_empty() {
            Some(Self("0".to_string()))
        } else {
            Some(Self(stripped.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the identifier one below this one, or None for zero
    pub fn predecessor(&self) -> Option<Self> {
        if self.0 == "0" {
            return None;
        }
        let mut digits = self.0.clone().into_bytes();
        for digit in digits.iter_mut().rev() {
            if *digit == b'0' {
                *digit = b'9';
            } else {
                *digit -= 1;
                break;
            }
        }
        let text = String::from_utf8(digits).ok()?;
        Self::parse(&text)
    }
}

impl Ord for PostId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for PostId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PostId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("'{}' is not a numeric post id", value))
    }
}

impl From<PostId> for String {
    fn from(id: PostId) -> Self {
        id.0
    }
}

/// One collected post, normalized for output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    pub author: String,
    /// `YYYY-MM-DD HH:MM:SS`, or the raw value when it could not be parsed
    pub timestamp: String,
    /// Body text with line breaks folded into spaces
    pub text: String,
    pub repost_count: u64,
    pub favorite_count: u64,
}

impl Post {
    /// Normalizes a raw search result
    ///
    /// Returns None if the result carries no usable identifier.
    pub fn from_raw(raw: &RawPost) -> Option<Self> {
        let id = PostId::parse(&raw.id)?;
        let timestamp = match raw.created_at.as_deref() {
            Some(value) => format_timestamp(value),
            None => "N/A".to_string(),
        };
        Some(Self {
            id,
            author: raw
                .author_name
                .clone()
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "N/A".to_string()),
            timestamp,
            text: normalize_text(raw.text.as_deref().unwrap_or_default()),
            repost_count: raw.repost_count.unwrap_or(0),
            favorite_count: raw.favorite_count.unwrap_or(0),
        })
    }
}

fn normalize_text(text: &str) -> String {
    text.replace('\n', " ").replace('\r', "")
}

/// Renders a post timestamp in the output layout
///
/// Accepts RFC 3339, the classic `Wed Oct 10 20:19:24 +0000 2018` layout, and
/// a bare `YYYY-MM-DDTHH:MM:SS` with optional fractional seconds.
fn format_timestamp(value: &str) -> String {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return parsed.naive_utc().format(POST_TIMESTAMP_FORMAT).to_string();
    }
    if let Ok(parsed) = DateTime::parse_from_str(value, "%a %b %d %H:%M:%S %z %Y") {
        return parsed.naive_utc().format(POST_TIMESTAMP_FORMAT).to_string();
    }
    let without_fraction = value.split('.').next().unwrap_or(value);
    if let Ok(parsed) = NaiveDateTime::parse_from_str(without_fraction, "%Y-%m-%dT%H:%M:%S") {
        return parsed.format(POST_TIMESTAMP_FORMAT).to_string();
    }
    value.to_string()
}
