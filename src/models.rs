//! Data models for the news listing and the response envelope.
//!
//! - [`NewsItem`]: one entry of the listing, keyed by its canonical URL
//! - [`FetchResult`]: the envelope returned for every fetch invocation
//! - [`Status`]: the public status vocabulary
//!
//! Field names on the wire use camelCase (`updatedTime`), hence the serde
//! renames. Both types are built fresh per invocation and never cached.

use serde::{Deserialize, Serialize};

/// Extra per-item metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ItemExtra {
    /// Publish date text exactly as the source prints it; empty when absent.
    pub date: String,
}

/// One entry of the news listing.
///
/// `id` and `url` are both the absolute URL of the article; the source has
/// no numeric id, so the URL is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct NewsItem {
    pub id: String,
    pub url: String,
    /// May be empty when the source omits it.
    pub title: String,
    pub extra: ItemExtra,
}

impl NewsItem {
    /// Build an item from an already-resolved absolute URL.
    pub fn new(url: String, title: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            id: url.clone(),
            url,
            title: title.into(),
            extra: ItemExtra { date: date.into() },
        }
    }
}

/// Outcome classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
    Timeout,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::Failure => "failure",
            Status::Timeout => "timeout",
            Status::Error => "error",
        }
    }
}

/// The envelope serialized as the HTTP response body.
///
/// # JSON Shape
///
/// ```text
/// { "status": "success", "id": "chwang", "updatedTime": 1704067200000,
///   "items": [ { "id": "...", "url": "...", "title": "...", "extra": { "date": "..." } } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FetchResult {
    pub status: Status,
    /// Identifier of the configured source.
    #[serde(rename = "id")]
    pub source_id: String,
    /// Epoch milliseconds at which this envelope was assembled.
    #[serde(rename = "updatedTime")]
    pub updated_time: i64,
    pub items: Vec<NewsItem>,
    /// Display text of the last error; only present on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}
