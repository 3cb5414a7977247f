//! Command-line interface definitions for the newsroom sync job.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Credentials and table identifiers can also be provided via environment
//! variables so the job can run unattended from a scheduler.

use clap::Parser;

/// Command-line arguments for one synchronization run.
///
/// Every option overrides the matching value from the `--config` file, which
/// in turn overrides the built-in defaults.
///
/// # Examples
///
/// ```sh
/// # Crawl until the feed runs dry
/// AIRTABLE_API_KEY=pat... insead_news_sync
///
/// # Bounded crawl, ten incremental pages with the fixed tokens
/// insead_news_sync --max-pages 10 --static-tokens
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML settings file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Airtable personal access token
    #[arg(long, env = "AIRTABLE_API_KEY", hide_env_values = true)]
    pub airtable_api_key: Option<String>,

    /// Airtable base id
    #[arg(long, env = "AIRTABLE_BASE_ID")]
    pub base_id: Option<String>,

    /// Airtable table id
    #[arg(long, env = "AIRTABLE_TABLE_ID")]
    pub table_id: Option<String>,

    /// Maximum number of incremental pages to request (0 = until the feed is empty)
    #[arg(short = 'p', long)]
    pub max_pages: Option<u32>,

    /// Pause between page requests, in milliseconds
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Per-request timeout, in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Use the fixed pagination tokens instead of resolving them from the page
    #[arg(long)]
    pub static_tokens: bool,

    /// Path of the detailed run log
    #[arg(short, long)]
    pub log_file: Option<String>,
}
