//! The fetch pipeline: render, extract with fallback, retry, normalize.
//!
//! One [`NewsFetcher::fetch`] call is one invocation. Each attempt opens a
//! fresh render session, runs the strategies in order until one yields items,
//! and releases the session before the next attempt or the return. Nothing is
//! shared between invocations except the immutable configuration.

use crate::config::SourceConfig;
use crate::error::{ConfigError, FetchError};
use crate::extractors::{self, ExtractContext, ExtractionStrategy};
use crate::models::{FetchResult, NewsItem};
use crate::normalize;
use crate::renderer::{RenderedPage, Renderer};
use crate::retry::RetryPolicy;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Fetches the configured source through a renderer.
#[derive(Clone)]
pub struct NewsFetcher {
    renderer: Arc<dyn Renderer>,
    config: Arc<SourceConfig>,
    strategies: Vec<Arc<dyn ExtractionStrategy>>,
    retry: RetryPolicy,
}

impl NewsFetcher {
    /// Build a fetcher with the default strategies (embedded data, then DOM).
    pub fn new(renderer: Arc<dyn Renderer>, config: SourceConfig) -> Result<Self, ConfigError> {
        let strategies = extractors::default_strategies(&config)?;
        Self::with_strategies(renderer, config, strategies)
    }

    /// Build a fetcher with an explicit, ordered strategy list.
    ///
    /// The configuration is validated here, so a config built in code gets
    /// the same checks as one loaded from YAML.
    pub fn with_strategies(
        renderer: Arc<dyn Renderer>,
        config: SourceConfig,
        strategies: Vec<Arc<dyn ExtractionStrategy>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let retry = RetryPolicy::new(config.max_retries, config.backoff());
        Ok(Self {
            renderer,
            config: Arc::new(config),
            strategies,
            retry,
        })
    }

    pub fn source_id(&self) -> &str {
        &self.config.source_id
    }

    /// Run one invocation and always return a well-formed envelope.
    #[instrument(level = "info", skip_all, fields(source = %self.config.source_id, renderer = self.renderer.name()))]
    pub async fn fetch(&self) -> FetchResult {
        let t0 = Instant::now();
        let outcome = self.retry.run(|n| self.attempt(n)).await;
        let result = normalize::assemble(&self.config.source_id, outcome);
        info!(
            status = result.status.as_str(),
            count = result.items.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetch finished"
        );
        result
    }

    #[instrument(level = "info", skip(self), fields(attempt = n + 1))]
    async fn attempt(&self, n: u32) -> Result<Vec<NewsItem>, FetchError> {
        let page = RenderedPage::open(
            self.renderer.as_ref(),
            &self.config.target_url,
            &self.config.readiness(),
            self.config.navigation_timeout(),
        )
        .await?;

        let outcome = self.run_strategies(&page).await;
        page.release().await;
        outcome
    }

    /// First non-empty result wins; a render failure ends the attempt.
    async fn run_strategies(&self, page: &RenderedPage) -> Result<Vec<NewsItem>, FetchError> {
        let Some(session) = page.session() else {
            return Err(FetchError::Render("session already released".to_string()));
        };
        let cx = ExtractContext {
            html: page.html(),
            session,
        };

        let mut misses = Vec::new();
        for strategy in &self.strategies {
            match strategy.try_extract(&cx).await {
                Ok(items) if !items.is_empty() => {
                    debug!(strategy = strategy.name(), count = items.len(), "Strategy produced items");
                    return Ok(items);
                }
                Ok(_) => misses.push(format!("{}: empty listing", strategy.name())),
                Err(e) if e.is_miss() => {
                    debug!(strategy = strategy.name(), error = %e, "Strategy missed; falling back");
                    misses.push(format!("{}: {e}", strategy.name()));
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Strategy failed");
                    return Err(e);
                }
            }
        }
        Err(FetchError::NotFound(misses.join("; ")))
    }
}

/// Fetch the configured source once with the default strategies.
///
/// # Arguments
///
/// * `renderer` - Engine that opens one browsing session per attempt
/// * `config` - Source description; validated before anything is rendered
///
/// # Returns
///
/// The [`FetchResult`] envelope for the invocation, whatever its status, or a
/// [`ConfigError`] if `config` is unusable. Configuration errors are reported
/// before any session is opened.
pub async fn fetch_news(
    renderer: Arc<dyn Renderer>,
    config: SourceConfig,
) -> Result<FetchResult, ConfigError> {
    Ok(NewsFetcher::new(renderer, config)?.fetch().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use crate::renderer::testing::{Script, ScriptedRenderer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const EMBEDDED_PAGE: &str = r#"<html><head><script>
        var allData = {"hotNews1":[{"url":"/a","title":"T1","newsTime":"2024-01-01"}]};
        </script></head><body></body></html>"#;

    const DOM_PAGE: &str = r#"<html><body>
        <a class="chw-newsDataItem" href="/news/1">
          <div class="chw-newsDataItem__title">Dom title</div>
          <div class="chw-newsDataItem__date">2024-02-02</div>
        </a>
        <a class="chw-newsDataItem" href="news/2">
          <div class="chw-newsDataItem__title">Second</div>
        </a>
        </body></html>"#;

    fn config() -> SourceConfig {
        SourceConfig {
            base_url: "https://www.site.com".to_string(),
            backoff_ms: 1_000,
            ..SourceConfig::default()
        }
    }

    fn fetcher(renderer: &Arc<ScriptedRenderer>) -> NewsFetcher {
        let renderer: Arc<dyn Renderer> = renderer.clone();
        NewsFetcher::new(renderer, config()).unwrap()
    }

    fn assert_well_formed(result: &FetchResult) {
        for item in &result.items {
            assert!(item.url.starts_with("https://"), "not absolute: {}", item.url);
            assert_eq!(item.id, item.url);
        }
    }

    #[tokio::test]
    async fn test_end_to_end_embedded_data() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![ScriptedRenderer::page(
            EMBEDDED_PAGE,
            true,
        )]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.source_id, "chwang");
        assert_eq!(
            result.items,
            vec![NewsItem::new(
                "https://www.site.com/a".to_string(),
                "T1",
                "2024-01-01"
            )]
        );
        // The DOM extractor never ran.
        assert_eq!(renderer.counters.selector_waits(), 0);
        assert_eq!(renderer.counters.opens(), renderer.counters.closes());
        assert_well_formed(&result);
    }

    #[tokio::test]
    async fn test_falls_back_to_dom() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![ScriptedRenderer::page(
            DOM_PAGE, true,
        )]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Success);
        let urls: Vec<&str> = result.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(
            urls,
            vec!["https://www.site.com/news/1", "https://www.site.com/news/2"]
        );
        assert_eq!(result.items[0].extra.date, "2024-02-02");
        assert_eq!(renderer.counters.selector_waits(), 1);
        assert_well_formed(&result);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_timeouts_exhaust_retries() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![Script::NavTimeout]));
        let t0 = tokio::time::Instant::now();
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Timeout);
        assert!(result.items.is_empty());
        assert_eq!(renderer.counters.opens(), 3);
        assert_eq!(renderer.counters.closes(), 3);
        let elapsed = t0.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_mixed_failures() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![
            Script::NavCrash,
            Script::NavTimeout,
            ScriptedRenderer::page(EMBEDDED_PAGE, true),
        ]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(renderer.counters.opens(), 3);
        assert_eq!(renderer.counters.closes(), 3);
        assert_eq!(renderer.counters.open_now(), 0);
        assert_eq!(renderer.counters.max_open(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failures_surface_as_error() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![Script::StartFails]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Error);
        assert_eq!(renderer.counters.opens(), 0);
        assert!(result.message.unwrap().contains("3 attempts"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_found_is_failure_not_empty_success() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![ScriptedRenderer::page(
            r#"<script>var allData = {"hotNews1":[]};</script>"#,
            false,
        )]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Failure);
        assert!(result.items.is_empty());
        assert_eq!(renderer.counters.opens(), 3);
        assert_eq!(renderer.counters.opens(), renderer.counters.closes());
    }

    #[tokio::test(start_paused = true)]
    async fn test_strategy_render_error_closes_session_and_reports_error() {
        // No embedded data, so the DOM strategy runs and its HTML re-read fails.
        let renderer = Arc::new(ScriptedRenderer::new(vec![Script::ContentLost {
            html: "<html><body></body></html>".to_string(),
        }]));
        let result = fetcher(&renderer).fetch().await;

        assert_eq!(result.status, Status::Error);
        assert!(result.items.is_empty());
        assert!(result.message.unwrap().contains("target crashed"));
        assert_eq!(renderer.counters.opens(), 3);
        assert_eq!(renderer.counters.closes(), 3);
        assert_eq!(renderer.counters.open_now(), 0);
        assert_eq!(renderer.counters.selector_waits(), 3);
    }

    struct CountingStrategy {
        calls: AtomicUsize,
        items: Vec<NewsItem>,
    }

    #[async_trait]
    impl ExtractionStrategy for CountingStrategy {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn try_extract(&self, _cx: &ExtractContext<'_>) -> Result<Vec<NewsItem>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.items.clone())
        }
    }

    #[tokio::test]
    async fn test_strategies_run_in_order_and_stop_at_first_hit() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![ScriptedRenderer::page(
            "<html></html>",
            true,
        )]));
        let empty = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            items: Vec::new(),
        });
        let hit = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            items: vec![NewsItem::new("https://www.site.com/x".to_string(), "X", "")],
        });
        let never = Arc::new(CountingStrategy {
            calls: AtomicUsize::new(0),
            items: Vec::new(),
        });

        let strategies: Vec<Arc<dyn ExtractionStrategy>> =
            vec![empty.clone(), hit.clone(), never.clone()];
        let dyn_renderer: Arc<dyn Renderer> = renderer.clone();
        let fetcher = NewsFetcher::with_strategies(dyn_renderer, config(), strategies).unwrap();
        let result = fetcher.fetch().await;

        assert_eq!(result.status, Status::Success);
        assert_eq!(result.items.len(), 1);
        assert_eq!(empty.calls.load(Ordering::SeqCst), 1);
        assert_eq!(hit.calls.load(Ordering::SeqCst), 1);
        assert_eq!(never.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_news_rejects_bad_config() {
        let renderer: Arc<dyn Renderer> = Arc::new(ScriptedRenderer::new(vec![]));
        let mut config = config();
        config.dom.container = "::[".to_string();
        assert!(fetch_news(renderer, config).await.is_err());
    }

    #[tokio::test]
    async fn test_fetch_news_rejects_bad_base_url_before_rendering() {
        let renderer = Arc::new(ScriptedRenderer::new(vec![ScriptedRenderer::page(
            EMBEDDED_PAGE,
            true,
        )]));
        let dyn_renderer: Arc<dyn Renderer> = renderer.clone();
        let config = SourceConfig {
            base_url: "not a url".to_string(),
            ..config()
        };

        let err = fetch_news(dyn_renderer, config).await.unwrap_err();
        assert!(matches!(err, ConfigError::Url { field: "base_url", .. }));
        assert_eq!(renderer.counters.opens(), 0);
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let renderer: Arc<dyn Renderer> = Arc::new(ScriptedRenderer::new(vec![]));
        let config = SourceConfig {
            max_retries: 0,
            ..config()
        };
        let err = NewsFetcher::with_strategies(renderer, config, Vec::new()).err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { field: "max_retries", .. }));
    }
}
