//! Source configuration.
//!
//! [`SourceConfig`] holds everything the pipeline needs to know about the
//! single configured source: where to navigate, how to decide the page is
//! ready, which embedded variable and field paths to read, which DOM
//! selectors to fall back on, and the retry bounds.
//!
//! The defaults describe the chwang.com news listing. An optional YAML file
//! overrides any subset of fields:
//!
//! ```yaml
//! max_retries: 5
//! wait_for_selector: ".chw-newsDataItem"
//! embedded:
//!   field_paths: ["data.newsList"]
//! ```

use crate::error::ConfigError;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use url::Url;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Condition a render step waits for before treating the page as loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// No network activity for a short quiet window.
    NetworkIdle,
    /// A node matching the selector is present.
    Selector(String),
}

/// Where the listing lives inside the embedded `var <name> = {...};` assignment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmbeddedConfig {
    /// Variable name of the assignment, e.g. `allData`.
    pub variable: String,
    /// Dotted paths tried in order; the first one holding a non-empty array wins.
    pub field_paths: Vec<String>,
    pub url_field: String,
    pub title_field: String,
    pub date_field: String,
}

impl Default for EmbeddedConfig {
    fn default() -> Self {
        Self {
            variable: "allData".to_string(),
            field_paths: vec!["newsList".to_string(), "hotNews1".to_string()],
            url_field: "url".to_string(),
            title_field: "title".to_string(),
            date_field: "newsTime".to_string(),
        }
    }
}

/// CSS selectors for the rendered listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DomSelectors {
    /// One node per listing entry.
    pub container: String,
    /// Title sub-element, relative to the container.
    pub title: String,
    /// Date sub-element, relative to the container.
    pub date: String,
    /// Attribute on the container holding the item link.
    pub link_attr: String,
}

impl Default for DomSelectors {
    fn default() -> Self {
        Self {
            container: ".chw-newsDataItem".to_string(),
            title: ".chw-newsDataItem__title".to_string(),
            date: ".chw-newsDataItem__date".to_string(),
            link_attr: "href".to_string(),
        }
    }
}

/// Complete description of one source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceConfig {
    pub source_id: String,
    pub target_url: String,
    /// Base for resolving relative links.
    pub base_url: String,
    /// Readiness selector; when absent navigation waits for network idle.
    pub wait_for_selector: Option<String>,
    pub navigation_timeout_ms: u64,
    /// How long the DOM extractor waits for the first container node.
    pub per_item_wait_ms: u64,
    /// Total attempts, including the first.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub backoff_ms: u64,
    pub user_agent: String,
    pub embedded: EmbeddedConfig,
    pub dom: DomSelectors,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source_id: "chwang".to_string(),
            target_url: "https://www.chwang.com/news".to_string(),
            base_url: "https://www.chwang.com".to_string(),
            wait_for_selector: None,
            navigation_timeout_ms: 60_000,
            per_item_wait_ms: 15_000,
            max_retries: 3,
            backoff_ms: 2_000,
            user_agent: DESKTOP_USER_AGENT.to_string(),
            embedded: EmbeddedConfig::default(),
            dom: DomSelectors::default(),
        }
    }
}

impl SourceConfig {
    /// Load the configuration, applying the YAML file at `path` over the defaults.
    ///
    /// With no path the defaults are used as-is. The result is validated
    /// before it is returned.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                let config: SourceConfig = serde_yaml::from_str(&text)?;
                info!(path = %path.display(), source_id = %config.source_id, "Loaded source configuration");
                config
            }
            None => SourceConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_id.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "source_id",
                reason: "must not be empty".to_string(),
            });
        }
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid {
                field: "max_retries",
                reason: "at least one attempt is required".to_string(),
            });
        }
        for (field, value) in [("target_url", &self.target_url), ("base_url", &self.base_url)] {
            if Url::parse(value).is_err() {
                return Err(ConfigError::Url {
                    field,
                    value: value.clone(),
                });
            }
        }
        if self.embedded.field_paths.is_empty() {
            return Err(ConfigError::Invalid {
                field: "embedded.field_paths",
                reason: "at least one field path is required".to_string(),
            });
        }

        let mut selectors = vec![
            ("dom.container", &self.dom.container),
            ("dom.title", &self.dom.title),
            ("dom.date", &self.dom.date),
        ];
        if let Some(selector) = &self.wait_for_selector {
            selectors.push(("wait_for_selector", selector));
        }
        for (field, value) in selectors {
            if Selector::parse(value).is_err() {
                return Err(ConfigError::Selector {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn readiness(&self) -> Readiness {
        match &self.wait_for_selector {
            Some(selector) => Readiness::Selector(selector.clone()),
            None => Readiness::NetworkIdle,
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn per_item_wait(&self) -> Duration {
        Duration::from_millis(self.per_item_wait_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
