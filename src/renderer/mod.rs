//! Page rendering behind a small capability interface.
//!
//! A [`Renderer`] opens [`RenderSession`]s; a session navigates once, hands
//! out the final HTML and answers selector waits. [`RenderedPage`] owns a
//! session for the duration of one attempt and guarantees it is closed on
//! every exit path.
//!
//! # Implementations
//!
//! | Renderer | Module | JavaScript | Notes |
//! |----------|--------|------------|-------|
//! | Chromium | [`chromium`] | yes | One headless browser per session |
//! | Plain HTTP | [`http`] | no | Fallback where no browser is installed |

pub mod chromium;
pub mod http;

use crate::config::Readiness;
use crate::error::FetchError;
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Something that can open browsing sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Start a fresh session. Fails with [`FetchError::Render`] when the
    /// engine cannot start (missing binary, resource exhaustion).
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError>;

    fn name(&self) -> &'static str;
}

/// One exclusive browsing session.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Load `url` and wait for `readiness`, all within `timeout`.
    async fn navigate(
        &mut self,
        url: &str,
        readiness: &Readiness,
        timeout: Duration,
    ) -> Result<(), FetchError>;

    /// Full HTML of the current document.
    async fn content(&self) -> Result<String, FetchError>;

    /// Wait until a node matching `selector` exists, or fail with
    /// [`FetchError::Timeout`].
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), FetchError>;

    /// Tear the session down. Called exactly once per session.
    async fn close(self: Box<Self>) -> Result<(), FetchError>;
}

/// A navigated session plus the HTML it rendered.
///
/// Call [`RenderedPage::release`] when done. If the page is dropped instead
/// (the caller was cancelled) the session is closed on a spawned task.
pub struct RenderedPage {
    session: Option<Box<dyn RenderSession>>,
    html: String,
}

impl RenderedPage {
    /// Open a session, navigate to `url` and capture the final HTML.
    ///
    /// On any failure the session is closed before the error is returned;
    /// partial HTML is never handed out.
    ///
    /// # Arguments
    ///
    /// * `renderer` - Engine to open the session with
    /// * `url` - Page to load
    /// * `readiness` - Condition that marks the page as loaded
    /// * `timeout` - Budget for navigation plus the readiness wait
    ///
    /// # Returns
    ///
    /// A page holding the open session and its HTML, or
    /// [`FetchError::Render`] when the session cannot start or crashes, or
    /// [`FetchError::Timeout`] when the budget runs out.
    #[instrument(level = "info", skip(renderer, readiness), fields(renderer = renderer.name()))]
    pub async fn open(
        renderer: &dyn Renderer,
        url: &str,
        readiness: &Readiness,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let t0 = Instant::now();
        let mut page = RenderedPage {
            session: Some(renderer.open().await?),
            html: String::new(),
        };

        let loaded = match page.session.as_mut() {
            Some(session) => match session.navigate(url, readiness, timeout).await {
                Ok(()) => session.content().await,
                Err(e) => Err(e),
            },
            None => Err(FetchError::Render("session already released".to_string())),
        };

        match loaded {
            Ok(html) => {
                debug!(
                    bytes = html.len(),
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    "Page rendered"
                );
                page.html = html;
                Ok(page)
            }
            Err(e) => {
                page.release().await;
                Err(e)
            }
        }
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn session(&self) -> Option<&dyn RenderSession> {
        self.session.as_deref()
    }

    /// Close the underlying session. Close failures are logged, not returned.
    pub async fn release(mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.close().await {
                warn!(error = %e, "Failed to close render session");
            }
        }
    }
}

impl Drop for RenderedPage {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!("Render session dropped without release; closing in background");
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(error = %e, "Failed to close abandoned render session");
                    }
                });
            }
            Err(_) => warn!("Render session dropped outside a runtime; it could not be closed"),
        }
    }
}
