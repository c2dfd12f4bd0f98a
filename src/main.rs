//! # chwang_news
//!
//! Republishes the chwang.com news listing, which has no stable API, as a
//! small JSON service.
//!
//! ## Usage
//!
//! ```sh
//! chwang_news serve --bind 0.0.0.0:3000
//! chwang_news fetch -o ./json
//! ```
//!
//! ## Architecture
//!
//! Each fetch invocation runs a short pipeline:
//! 1. **Render**: open a headless browser session and load the listing page
//! 2. **Extract**: read the embedded `var allData = {...};` data, falling back to the rendered DOM
//! 3. **Retry**: failed attempts are retried with a fixed backoff on a fresh session
//! 4. **Normalize**: the outcome becomes a `{status, id, updatedTime, items}` envelope

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extractors;
mod models;
mod normalize;
mod outputs;
mod pipeline;
mod renderer;
mod retry;
mod server;
mod utils;

use cli::{Cli, Command, RendererKind};
use config::SourceConfig;
use outputs::json;
use pipeline::NewsFetcher;
use renderer::Renderer;
use renderer::chromium::ChromiumRenderer;
use renderer::http::HttpRenderer;
use utils::ensure_writable_dir;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = SourceConfig::load(args.config.as_deref())?;
    info!(
        source_id = %config.source_id,
        target_url = %config.target_url,
        max_retries = config.max_retries,
        backoff_ms = config.backoff_ms,
        "Loaded configuration"
    );

    let renderer: Arc<dyn Renderer> = match args.renderer {
        RendererKind::Chromium => Arc::new(ChromiumRenderer::new(args.chromium_path.clone())?),
        RendererKind::Http => Arc::new(HttpRenderer::new(&config.user_agent)?),
    };

    match args.command {
        Command::Serve { bind } => server::serve(bind, NewsFetcher::new(renderer, config)?).await,
        Command::Fetch { output_dir } => fetch_once(renderer, config, output_dir.as_deref()).await,
    }
}

/// Run one invocation, print the envelope and optionally write it to disk.
async fn fetch_once(
    renderer: Arc<dyn Renderer>,
    config: SourceConfig,
    output_dir: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    if let Some(dir) = output_dir {
        if let Err(e) = ensure_writable_dir(dir).await {
            error!(
                path = %dir,
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let start_time = std::time::Instant::now();
    let result = pipeline::fetch_news(renderer, config).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if let Some(dir) = output_dir {
        json::write_result(&result, dir).await?;
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        status = result.status.as_str(),
        count = result.items.len(),
        "Execution complete"
    );

    if result.is_success() {
        Ok(())
    } else {
        Err(format!(
            "fetch finished with status `{}`: {}",
            result.status.as_str(),
            result.message.as_deref().unwrap_or("no detail")
        )
        .into())
    }
}
