//! Plain-HTTP renderer for hosts without a browser.
//!
//! Fetches the page with a desktop User-Agent and never runs JavaScript, so
//! it only sees what the server sends. Embedded `var ... = ...;` data is in
//! the initial HTML for most sources, which is usually enough.

use super::{RenderSession, Renderer};
use crate::config::Readiness;
use crate::error::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(user_agent: &str) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .build()
            .map_err(|e| FetchError::Render(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            html: None,
        }))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

pub struct HttpSession {
    client: Client,
    html: Option<String>,
}

/// Whether `html` contains a node matching `selector`.
fn has_selector(html: &str, selector: &str) -> Result<bool, FetchError> {
    let selector = Selector::parse(selector)
        .map_err(|e| FetchError::Render(format!("invalid selector `{selector}`: {e}")))?;
    let document = Html::parse_document(html);
    Ok(document.select(&selector).next().is_some())
}

#[async_trait]
impl RenderSession for HttpSession {
    #[instrument(level = "info", skip(self, readiness), fields(?timeout))]
    async fn navigate(
        &mut self,
        url: &str,
        readiness: &Readiness,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let t0 = Instant::now();
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    stage: "navigating",
                    elapsed_ms: t0.elapsed().as_millis() as u64,
                }
            } else {
                FetchError::Render(format!("request failed: {e}"))
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Render(format!("HTTP {status} from {url}")));
        }
        let html = response.text().await.map_err(classify)?;
        debug!(bytes = html.len(), "Fetched page without JavaScript");

        // Nothing changes after load, so a missing readiness selector can only time out.
        if let Readiness::Selector(selector) = readiness {
            if !has_selector(&html, selector)? {
                return Err(FetchError::Timeout {
                    stage: "waiting for readiness selector",
                    elapsed_ms: t0.elapsed().as_millis() as u64,
                });
            }
        }
        self.html = Some(html);
        Ok(())
    }

    async fn content(&self) -> Result<String, FetchError> {
        self.html
            .clone()
            .ok_or_else(|| FetchError::Render("no page loaded".to_string()))
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), FetchError> {
        let html = self.content().await?;
        if has_selector(&html, selector)? {
            Ok(())
        } else {
            Err(FetchError::Timeout {
                stage: "waiting for selector",
                elapsed_ms: timeout.as_millis() as u64,
            })
        }
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        Ok(())
    }
}
