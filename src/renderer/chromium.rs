//! Chromium-based renderer using chromiumoxide.
//!
//! Every session launches its own headless browser so a crashed or wedged
//! browser from one attempt can never leak into the next.

use super::{RenderSession, Renderer};
use crate::config::Readiness;
use crate::error::FetchError;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

const SELECTOR_POLL: Duration = Duration::from_millis(250);
/// How long a closed browser gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// The browser process as seen by teardown.
#[async_trait]
trait BrowserProcess: Send {
    /// Ask the browser to close over CDP.
    async fn request_close(&mut self) -> Result<(), String>;
    /// Wait for the child process to exit.
    async fn wait_exit(&mut self) -> std::io::Result<()>;
    /// Kill the child process.
    async fn kill(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<(), String> {
        self.close().await.map(|_| ()).map_err(|e| e.to_string())
    }

    async fn wait_exit(&mut self) -> std::io::Result<()> {
        self.wait().await.map(|_| ())
    }

    async fn kill(&mut self) -> std::io::Result<()> {
        Browser::kill(self).await.unwrap_or(Ok(()))
    }
}

/// Close the browser and make sure its process is gone within a bounded time.
///
/// A failed or slow CDP close, or a process that does not exit within
/// `grace`, ends in a kill. Returns the close error, if any.
async fn shutdown<P: BrowserProcess>(process: &mut P, grace: Duration) -> Result<(), FetchError> {
    let closed = match tokio::time::timeout(grace, process.request_close()).await {
        Ok(result) => result,
        Err(_) => Err(format!("close request timed out after {}ms", grace.as_millis())),
    };

    let exited = closed.is_ok() && tokio::time::timeout(grace, process.wait_exit()).await.is_ok();
    if !exited {
        warn!(grace_ms = grace.as_millis() as u64, "Browser did not shut down cleanly; killing it");
        if let Err(e) = process.kill().await {
            warn!(error = %e, "Failed to kill browser process");
        }
    }

    closed.map_err(|e| FetchError::Render(format!("failed to close browser: {e}")))
}

/// Find the Chromium binary: explicit path first, then the usual names on `PATH`.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.clone());
        }
        warn!(path = %path.display(), "Configured Chromium path does not exist; searching PATH");
    }
    ["google-chrome", "chromium", "chromium-browser"]
        .iter()
        .find_map(|name| which::which(name).ok())
}

/// Launches a fresh headless Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    executable: PathBuf,
}

impl ChromiumRenderer {
    /// Locate Chromium; fails if no binary can be found.
    pub fn new(explicit: Option<PathBuf>) -> Result<Self, FetchError> {
        let executable = find_chromium(explicit.as_ref()).ok_or_else(|| {
            FetchError::Render(
                "Chromium not found; set --chromium-path or install chromium".to_string(),
            )
        })?;
        info!(path = %executable.display(), "Using Chromium");
        Ok(Self { executable })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    #[instrument(level = "info", skip_all)]
    async fn open(&self) -> Result<Box<dyn RenderSession>, FetchError> {
        let config = BrowserConfig::builder()
            .chrome_executable(&self.executable)
            .arg("--headless=new")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| FetchError::Render(format!("failed to build browser config: {e}")))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Render(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = shutdown(&mut browser, EXIT_GRACE).await;
                handler_task.abort();
                return Err(FetchError::Render(format!("failed to open tab: {e}")));
            }
        };

        debug!("Chromium session opened");
        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// One browser with a single tab.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl ChromiumSession {
    async fn load(&self, url: &str, readiness: &Readiness, deadline: Instant) -> Result<(), FetchError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| FetchError::Render(format!("navigation failed: {e}")))?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        match readiness {
            Readiness::NetworkIdle => self.wait_for_network_idle(remaining).await,
            Readiness::Selector(selector) => self.poll_selector(selector).await,
        }
    }

    /// Poll the page's resource count until it stops growing for a quiet window.
    async fn wait_for_network_idle(&self, budget: Duration) -> Result<(), FetchError> {
        let budget_ms = budget.as_millis().min(u128::from(u64::MAX)) as u64;
        let js = format!(
            r#"(async () => {{
                const timeoutMs = {budget_ms};
                const idleMs = 500;
                const interval = 100;
                const start = Date.now();
                let last = performance.getEntriesByType('resource').length;
                let stable = 0;
                while (Date.now() - start < timeoutMs) {{
                    await new Promise(r => setTimeout(r, interval));
                    const cur = performance.getEntriesByType('resource').length;
                    if (document.readyState === 'complete' && cur === last) {{
                        stable += interval;
                        if (stable >= idleMs) return true;
                    }} else {{
                        stable = 0;
                    }}
                    last = cur;
                }}
                return false;
            }})()"#
        );

        let idle = self
            .page
            .evaluate(js)
            .await
            .map_err(|e| FetchError::Render(format!("network-idle probe failed: {e}")))?
            .into_value::<bool>()
            .unwrap_or(false);

        if idle {
            Ok(())
        } else {
            Err(FetchError::Timeout {
                stage: "waiting for network idle",
                elapsed_ms: budget_ms,
            })
        }
    }

    async fn poll_selector(&self, selector: &str) -> Result<(), FetchError> {
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            tokio::time::sleep(SELECTOR_POLL).await;
        }
    }
}

#[async_trait]
impl RenderSession for ChromiumSession {
    #[instrument(level = "info", skip(self, readiness), fields(?timeout))]
    async fn navigate(
        &mut self,
        url: &str,
        readiness: &Readiness,
        timeout: Duration,
    ) -> Result<(), FetchError> {
        let t0 = Instant::now();
        let deadline = t0 + timeout;
        match tokio::time::timeout(timeout, self.load(url, readiness, deadline)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                stage: "navigating",
                elapsed_ms: t0.elapsed().as_millis() as u64,
            }),
        }
    }

    async fn content(&self) -> Result<String, FetchError> {
        self.page
            .content()
            .await
            .map_err(|e| FetchError::Render(format!("failed to read page HTML: {e}")))
    }

    #[instrument(level = "debug", skip(self))]
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<(), FetchError> {
        tokio::time::timeout(timeout, self.poll_selector(selector))
            .await
            .map_err(|_| FetchError::Timeout {
                stage: "waiting for selector",
                elapsed_ms: timeout.as_millis() as u64,
            })?
    }

    async fn close(self: Box<Self>) -> Result<(), FetchError> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
        } = *self;

        let _ = tokio::time::timeout(EXIT_GRACE, page.close()).await;
        let closed = shutdown(&mut browser, EXIT_GRACE).await;
        handler_task.abort();
        debug!("Chromium session closed");
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::RenderedPage;

    /// Stand-in browser process that records how teardown treated it.
    #[derive(Default)]
    struct FakeProcess {
        close_fails: bool,
        close_hangs: bool,
        exit_hangs: bool,
        waited: bool,
        killed: bool,
    }

    #[async_trait]
    impl BrowserProcess for FakeProcess {
        async fn request_close(&mut self) -> Result<(), String> {
            if self.close_hangs {
                std::future::pending::<()>().await;
            }
            if self.close_fails {
                Err("request timed out".to_string())
            } else {
                Ok(())
            }
        }

        async fn wait_exit(&mut self) -> std::io::Result<()> {
            self.waited = true;
            if self.exit_hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn kill(&mut self) -> std::io::Result<()> {
            self.killed = true;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clean_shutdown_does_not_kill() {
        let mut process = FakeProcess::default();
        assert!(shutdown(&mut process, EXIT_GRACE).await.is_ok());
        assert!(process.waited);
        assert!(!process.killed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_close_kills_without_waiting() {
        let mut process = FakeProcess {
            close_fails: true,
            exit_hangs: true,
            ..FakeProcess::default()
        };
        let err = shutdown(&mut process, EXIT_GRACE).await.unwrap_err();
        assert!(matches!(err, FetchError::Render(_)));
        assert!(!process.waited);
        assert!(process.killed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_that_never_exits_is_killed_after_grace() {
        let mut process = FakeProcess {
            exit_hangs: true,
            ..FakeProcess::default()
        };
        let t0 = tokio::time::Instant::now();
        assert!(shutdown(&mut process, EXIT_GRACE).await.is_ok());
        assert!(process.killed);
        let elapsed = t0.elapsed();
        assert!(elapsed >= EXIT_GRACE && elapsed < EXIT_GRACE * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_close_request_is_bounded() {
        let mut process = FakeProcess {
            close_hangs: true,
            ..FakeProcess::default()
        };
        assert!(shutdown(&mut process, EXIT_GRACE).await.is_err());
        assert!(process.killed);
    }

    #[test]
    fn test_missing_explicit_path_falls_back() {
        let bogus = PathBuf::from("/nonexistent/chrome");
        // Must not return the bogus path whether or not a system browser exists.
        assert_ne!(find_chromium(Some(&bogus)), Some(bogus));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_chromium_renders_data_url() {
        let renderer = ChromiumRenderer::new(None).expect("Chromium not found");
        let page = RenderedPage::open(
            &renderer,
            "data:text/html,<a class='item' href='/a'><h1>Hello</h1></a>",
            &Readiness::Selector(".item".to_string()),
            Duration::from_secs(30),
        )
        .await
        .expect("render failed");

        assert!(page.html().contains("<h1>Hello</h1>"));
        let session = page.session().expect("session released early");
        session
            .wait_for_selector(".item", Duration::from_secs(5))
            .await
            .expect("selector missing");
        page.release().await;
    }
}
