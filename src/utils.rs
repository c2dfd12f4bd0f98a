//! Utility functions for link resolution, log previews, timestamps and file system checks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z0-9+.\-]*):").unwrap());

/// Resolve a link from the listing against the source's base URL.
///
/// - absolute `http`/`https` (`https://x/a`) is returned as-is
/// - protocol-relative (`//cdn/a`) takes the base URL's scheme
/// - root-relative (`/news/1`) is appended to the base
/// - bare-relative (`news/1`) is appended to the base with a `/` separator
///
/// # Arguments
///
/// * `base_url` - Scheme and host of the source, e.g. `https://www.chwang.com`
/// * `href` - Link exactly as the listing carries it
///
/// # Returns
///
/// The absolute URL, or `None` when the link is empty or uses any other
/// scheme (`javascript:`, `mailto:`, ...) and so cannot be an article.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(resolve_link("https://www.site.com", "/news/1").unwrap(), "https://www.site.com/news/1");
/// assert_eq!(resolve_link("https://www.site.com", "news/1").unwrap(), "https://www.site.com/news/1");
/// ```
pub fn resolve_link(base_url: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if let Some(caps) = SCHEME.captures(href) {
        let scheme = caps[1].to_ascii_lowercase();
        return (scheme == "http" || scheme == "https").then(|| href.to_string());
    }

    let base = base_url.trim_end_matches('/');
    if let Some(rest) = href.strip_prefix("//") {
        let scheme = base.split_once("://").map(|(s, _)| s).unwrap_or("https");
        return Some(format!("{scheme}://{rest}"));
    }
    if href.starts_with('/') {
        Some(format!("{base}{href}"))
    } else {
        Some(format!("{base}/{href}"))
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (backing off to a char
/// boundary) with an ellipsis and byte count appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if needed, then writes and removes a probe file.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
