//! # INSEAD News Sync
//!
//! A batch job that discovers articles on the INSEAD newsroom and mirrors
//! their metadata (title, image, publication date, canonical URL) into an
//! Airtable table, writing each article at most once.
//!
//! ## Usage
//!
//! ```sh
//! AIRTABLE_API_KEY=pat... insead_news_sync --max-pages 10
//! ```
//!
//! ## Architecture
//!
//! The job is strictly sequential:
//! 1. **Known URLs**: List the table and collect every stored article URL
//! 2. **Listing**: Fetch the newsroom page, parse its cards, resolve the
//!    pagination tokens embedded in it
//! 3. **Pagination**: Request further pages one at a time until the feed
//!    runs dry, a request fails, or the page cap is hit
//! 4. **Sink**: Write each card whose normalized URL is new
//!
//! Nothing is persisted locally; the table is the only record of past runs.

use clap::Parser;
use std::error::Error;
use std::path::Path;
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::fmt as tfmt;

mod cli;
mod config;
mod models;
mod scrapers;
mod session;
mod sink;
mod store;
mod utils;

use cli::Cli;
use config::Settings;
use scrapers::feed::HttpFeed;
use session::Session;
use store::airtable::AirtableStore;

/// Install a stdout layer for progress and a DEBUG file layer for the run log.
///
/// The returned guard flushes the file writer when dropped. If the log file
/// cannot be created the job still runs with stdout logging only.
fn init_tracing(log_file: &str) -> Option<WorkerGuard> {
    let stdout_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tfmt::layer()
        .with_target(false)
        .with_timer(UtcTime::rfc_3339())
        .with_filter(stdout_filter);

    let file = Path::new(log_file)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::File::create(log_file));

    match file {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let file_layer = tfmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_timer(UtcTime::rfc_3339())
                .with_writer(writer)
                .with_filter(EnvFilter::new("info,insead_news_sync=debug"));
            tracing_subscriber::registry()
                .with(stdout_layer)
                .with(file_layer)
                .init();
            info!(path = %log_file, "Run log initialized");
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(stdout_layer).init();
            warn!(path = %log_file, error = %e, "Failed to open run log; logging to stdout only");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    let settings = Settings::load(&args)?;

    let _log_guard = init_tracing(settings.log_file());
    info!("insead_news_sync starting up");
    debug!(
        max_pages = settings.feed.max_pages,
        delay_ms = settings.feed.delay_ms,
        static_tokens = settings.feed.static_tokens,
        "Effective settings"
    );

    // Fatal before any network activity.
    let Some(api_key) = args
        .airtable_api_key
        .as_deref()
        .filter(|key| !key.trim().is_empty())
    else {
        error!("AIRTABLE_API_KEY missing");
        println!("AIRTABLE_API_KEY missing.");
        return Err("AIRTABLE_API_KEY missing".into());
    };

    let store = AirtableStore::new(api_key, &settings.store)?;
    let feed = HttpFeed::new(&settings.feed)?;
    let session = Session::new(feed, store, settings);

    let summary = match session.run().await {
        Ok(summary) => summary,
        Err(e) => {
            println!("Failed to load existing records: {e}");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        pages = summary.pages_with_cards,
        stop_reason = %summary.stop_reason,
        "Execution complete"
    );
    println!(
        "Done. Added: {}, Skipped: {}, Failed: {}",
        summary.tally.added, summary.tally.skipped, summary.tally.failed
    );

    Ok(())
}
