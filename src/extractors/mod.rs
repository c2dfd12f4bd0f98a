//! Extraction strategies that turn a rendered page into news items.
//!
//! Each strategy implements [`ExtractionStrategy`]; the pipeline tries them in
//! order and takes the first non-empty result.
//!
//! | Strategy | Module | Reads | Miss means |
//! |----------|--------|-------|------------|
//! | Embedded data | [`embedded`] | `var <name> = {...};` in the HTML | assignment absent, unparsable, or empty |
//! | DOM | [`dom`] | repeating container nodes | no container appeared within the wait |
//!
//! A miss is reported as [`FetchError::NotFound`] and is never surfaced to the
//! caller on its own. Render failures raised while extracting (a crashed
//! session during a selector wait) propagate and fail the attempt.

pub mod dom;
pub mod embedded;

use crate::config::SourceConfig;
use crate::error::{ConfigError, FetchError};
use crate::models::NewsItem;
use crate::renderer::RenderSession;
use async_trait::async_trait;
use std::sync::Arc;

/// What a strategy gets to look at.
pub struct ExtractContext<'a> {
    /// HTML captured right after navigation.
    pub html: &'a str,
    /// The live session, for strategies that need to wait on the DOM.
    pub session: &'a dyn RenderSession,
}

#[async_trait]
pub trait ExtractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extract items in presentation order. An empty listing is a miss.
    async fn try_extract(&self, cx: &ExtractContext<'_>) -> Result<Vec<NewsItem>, FetchError>;
}

/// The configured strategies in fallback order: embedded data, then DOM.
pub fn default_strategies(
    config: &SourceConfig,
) -> Result<Vec<Arc<dyn ExtractionStrategy>>, ConfigError> {
    let embedded: Arc<dyn ExtractionStrategy> = Arc::new(embedded::EmbeddedExtractor::new(
        config.embedded.clone(),
        &config.base_url,
    )?);
    let dom: Arc<dyn ExtractionStrategy> = Arc::new(dom::DomExtractor::new(
        &config.dom,
        &config.base_url,
        config.per_item_wait(),
    )?);
    Ok(vec![embedded, dom])
}
