//! Embedded-data extractor.
//!
//! Many listing pages ship their data in an inline script:
//!
//! ```text
//! <script>var allData = {"hotNews1":[{"url":"/a","title":"T1","newsTime":"2024-01-01"}]};</script>
//! ```
//!
//! The extractor locates the first `var <name> =` assignment, parses exactly
//! one JSON value after it (string contents may contain `;`), walks the
//! configured field paths and maps the first non-empty array to items.

use super::{ExtractContext, ExtractionStrategy};
use crate::config::EmbeddedConfig;
use crate::error::{ConfigError, FetchError};
use crate::models::NewsItem;
use crate::utils::{resolve_link, truncate_for_log};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

pub struct EmbeddedExtractor {
    config: EmbeddedConfig,
    base_url: String,
    assignment: Regex,
}

impl EmbeddedExtractor {
    pub fn new(config: EmbeddedConfig, base_url: &str) -> Result<Self, ConfigError> {
        let pattern = format!(r"var\s+{}\s*=\s*", regex::escape(&config.variable));
        let assignment = Regex::new(&pattern).map_err(|e| ConfigError::Invalid {
            field: "embedded.variable",
            reason: e.to_string(),
        })?;
        Ok(Self {
            config,
            base_url: base_url.to_string(),
            assignment,
        })
    }

    /// Parse the embedded listing out of `html`.
    ///
    /// Returns [`FetchError::NotFound`] when the assignment or every field path
    /// is missing or empty, and [`FetchError::Parse`] when the assigned value
    /// is not valid JSON.
    pub fn extract(&self, html: &str) -> Result<Vec<NewsItem>, FetchError> {
        let Some(found) = self.assignment.find(html) else {
            return Err(FetchError::NotFound(format!(
                "no `var {}` assignment",
                self.config.variable
            )));
        };
        let data = parse_assigned_value(&html[found.end()..])?;

        for path in &self.config.field_paths {
            let Some(raw_items) = lookup(&data, path).and_then(Value::as_array) else {
                debug!(%path, "Field path missing or not an array");
                continue;
            };
            if raw_items.is_empty() {
                debug!(%path, "Field path holds an empty array");
                continue;
            }

            let items: Vec<NewsItem> = raw_items.iter().filter_map(|raw| self.map_item(raw)).collect();
            if items.is_empty() {
                debug!(%path, "No entry under field path has a usable link");
                continue;
            }
            debug!(%path, count = items.len(), "Mapped embedded items");
            return Ok(items);
        }

        Err(FetchError::NotFound(format!(
            "none of {:?} holds a non-empty item list",
            self.config.field_paths
        )))
    }

    fn map_item(&self, raw: &Value) -> Option<NewsItem> {
        let href = text_field(raw, &self.config.url_field);
        let Some(url) = resolve_link(&self.base_url, &href) else {
            debug!(item = %truncate_for_log(&raw.to_string(), 200), "Skipping embedded item without url");
            return None;
        };
        Some(NewsItem::new(
            url,
            text_field(raw, &self.config.title_field),
            text_field(raw, &self.config.date_field),
        ))
    }
}

#[async_trait]
impl ExtractionStrategy for EmbeddedExtractor {
    fn name(&self) -> &'static str {
        "embedded"
    }

    #[instrument(level = "info", skip_all, fields(variable = %self.config.variable))]
    async fn try_extract(&self, cx: &ExtractContext<'_>) -> Result<Vec<NewsItem>, FetchError> {
        match self.extract(cx.html) {
            Ok(items) => {
                info!(count = items.len(), "Extracted news from embedded data");
                Ok(items)
            }
            Err(FetchError::Parse(reason)) => {
                warn!(%reason, "Embedded data matched but did not parse; treating as not found");
                Err(FetchError::NotFound(format!("embedded data unparsable: {reason}")))
            }
            Err(e) => Err(e),
        }
    }
}

/// Parse one JSON value from the start of `rest` and check the statement ends there.
fn parse_assigned_value(rest: &str) -> Result<Value, FetchError> {
    let mut stream = serde_json::Deserializer::from_str(rest).into_iter::<Value>();
    let value = match stream.next() {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            return Err(FetchError::Parse(format!(
                "{e} near `{}`",
                truncate_for_log(rest, 120)
            )));
        }
        None => return Err(FetchError::Parse("assignment has no value".to_string())),
    };

    let tail = rest[stream.byte_offset()..].trim_start();
    match tail.chars().next() {
        None | Some(';') | Some('<') => Ok(value),
        Some(other) => Err(FetchError::Parse(format!(
            "unexpected `{other}` after assigned value"
        ))),
    }
}

/// Walk a dotted path such as `data.newsList` or `lists.0.items`.
fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => current.get(segment),
        })
}

/// String form of a scalar field; empty when absent or null.
fn text_field(raw: &Value, field: &str) -> String {
    match raw.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
