//! Command-line interface definitions for chwang_news.
//!
//! All arguments can be provided via command-line flags or environment variables.

use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Command-line arguments for the news service.
///
/// # Examples
///
/// ```sh
/// # Serve the JSON API on port 3000
/// chwang_news serve
///
/// # Fetch once, print the envelope and keep a copy on disk
/// chwang_news fetch --output-dir ./json
///
/// # Use plain HTTP instead of a headless browser
/// chwang_news --renderer http fetch
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML source configuration overriding the defaults
    #[arg(short, long, global = true, env = "CHWANG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Page renderer to use
    #[arg(long, global = true, env = "CHWANG_RENDERER", value_enum, default_value_t = RendererKind::Chromium)]
    pub renderer: RendererKind,

    /// Path to the Chromium/Chrome executable (searched on PATH when absent)
    #[arg(long, global = true, env = "CHROMIUM_PATH")]
    pub chromium_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve `GET /api/s?id=<source>` over HTTP
    Serve {
        /// Address to listen on
        #[arg(short, long, env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },
    /// Fetch the listing once and print the JSON envelope
    Fetch {
        /// Also write `<source_id>.json` into this directory
        #[arg(short, long)]
        output_dir: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RendererKind {
    /// Headless Chromium; runs the page's JavaScript
    Chromium,
    /// Plain HTTP GET; no JavaScript
    Http,
}
