//! DOM extractor.
//!
//! Waits for the listing's container nodes to appear in the live page, then
//! re-reads the rendered HTML and maps each container (in document order) to
//! a [`NewsItem`]:
//!
//! ```text
//! <a class="chw-newsDataItem" href="/news/1">
//!   <div class="chw-newsDataItem__title">Title</div>
//!   <div class="chw-newsDataItem__date">2024-01-01</div>
//! </a>
//! ```

use super::{ExtractContext, ExtractionStrategy};
use crate::config::DomSelectors;
use crate::error::{ConfigError, FetchError};
use crate::models::NewsItem;
use crate::utils::resolve_link;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};

static NESTED_LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

pub struct DomExtractor {
    container_css: String,
    container: Selector,
    title: Selector,
    date: Selector,
    link_attr: String,
    base_url: String,
    per_item_wait: Duration,
}

fn parse_selector(field: &'static str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|_| ConfigError::Selector {
        field,
        value: css.to_string(),
    })
}

impl DomExtractor {
    pub fn new(
        selectors: &DomSelectors,
        base_url: &str,
        per_item_wait: Duration,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            container_css: selectors.container.clone(),
            container: parse_selector("dom.container", &selectors.container)?,
            title: parse_selector("dom.title", &selectors.title)?,
            date: parse_selector("dom.date", &selectors.date)?,
            link_attr: selectors.link_attr.clone(),
            base_url: base_url.to_string(),
            per_item_wait,
        })
    }

    /// Map every container node in `html` to an item, in document order.
    pub fn extract(&self, html: &str) -> Result<Vec<NewsItem>, FetchError> {
        let document = Html::parse_document(html);
        let mut items = Vec::new();
        let mut matched = 0usize;

        for node in document.select(&self.container) {
            matched += 1;
            let Some(url) = self
                .link_of(&node)
                .and_then(|href| resolve_link(&self.base_url, href))
            else {
                debug!(position = matched, "Skipping container without a link");
                continue;
            };
            items.push(NewsItem::new(
                url,
                first_text(&node, &self.title),
                first_text(&node, &self.date),
            ));
        }

        if items.is_empty() {
            return Err(FetchError::NotFound(format!(
                "`{}` matched {matched} nodes but produced no items",
                self.container_css
            )));
        }
        Ok(items)
    }

    /// The container's own link attribute, else the first nested `a[href]`.
    fn link_of<'a>(&self, node: &ElementRef<'a>) -> Option<&'a str> {
        node.value().attr(&self.link_attr).or_else(|| {
            node.select(&NESTED_LINK)
                .next()
                .and_then(|a| a.value().attr("href"))
        })
    }
}

/// Trimmed text of the first descendant matching `selector`, or empty.
fn first_text(node: &ElementRef<'_>, selector: &Selector) -> String {
    node.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl ExtractionStrategy for DomExtractor {
    fn name(&self) -> &'static str {
        "dom"
    }

    #[instrument(level = "info", skip_all, fields(container = %self.container_css))]
    async fn try_extract(&self, cx: &ExtractContext<'_>) -> Result<Vec<NewsItem>, FetchError> {
        match cx
            .session
            .wait_for_selector(&self.container_css, self.per_item_wait)
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_timeout() => {
                return Err(FetchError::NotFound(format!(
                    "`{}` did not appear within {}ms",
                    self.container_css,
                    self.per_item_wait.as_millis()
                )));
            }
            Err(e) => return Err(e),
        }

        // The DOM may have grown since navigation finished; read it again.
        let html = cx.session.content().await?;
        let items = self.extract(&html)?;
        info!(count = items.len(), "Extracted news from DOM");
        Ok(items)
    }
}
