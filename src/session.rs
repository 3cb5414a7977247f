//! One synchronization run.
//!
//! A [`Session`] owns the collaborators a run needs (feed transport, record
//! store, settings) and wires the pipeline together:
//!
//! 1. Load every existing record and build the [`KnownUrls`] set (fatal on error)
//! 2. Fetch and parse the listing page, resolving pagination tokens
//! 3. Offer each page's cards to the [`DedupSink`], page after page, until
//!    the feed ends, a page fails, or the page cap is reached
//!
//! Page-level and card-level problems end pagination or drop a card; they
//! never turn a healthy run into an error. Only failures before scraping
//! starts are returned as `Err`.

use crate::config::Settings;
use crate::models::{BatchTally, RunSummary, StopReason};
use crate::scrapers::feed::{FeedTransport, IncrementalFetcher, Step};
use crate::sink::{DedupSink, KnownUrls};
use crate::store::{RecordStore, StoreError};
use tracing::{error, info, instrument};

pub struct Session<F, S> {
    feed: F,
    store: S,
    settings: Settings,
}

impl<F: FeedTransport, S: RecordStore> Session<F, S> {
    pub fn new(feed: F, store: S, settings: Settings) -> Self {
        Self {
            feed,
            store,
            settings,
        }
    }

    /// Run the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Returns an error only if the existing records cannot be listed.
    #[instrument(level = "info", skip_all)]
    pub async fn run(&self) -> Result<RunSummary, StoreError> {
        let records = self.store.list_all_records().await.inspect_err(|e| {
            error!(error = %e, "Failed to load existing records");
        })?;
        let known = KnownUrls::from_records(&records, &self.settings.store.article_url_column);
        info!(count = known.len(), "Loaded existing article URLs");

        let mut sink = DedupSink::new(&self.store, &self.settings.store.fields, known);
        let mut tally = BatchTally::default();

        let (mut fetcher, first_cards) =
            match IncrementalFetcher::init(&self.feed, &self.settings.feed).await {
                Ok(init) => init,
                Err(e) => {
                    error!(error = %e, "Listing page fetch failed; ending run");
                    return Ok(RunSummary {
                        tally,
                        pages_with_cards: 0,
                        stop_reason: StopReason::FetchFailed(e.to_string()),
                    });
                }
            };

        info!(
            view_dom_id = %fetcher.cursor().tokens().view_dom_id,
            first_page = fetcher.cursor().page_index(),
            "Feed cursor ready"
        );
        let mut pages_with_cards = 0;
        if !first_cards.is_empty() {
            pages_with_cards += 1;
            tally += sink.offer_all(&first_cards).await;
        }

        let stop_reason = loop {
            match fetcher.next_page().await {
                Step::Page { index, cards } => {
                    pages_with_cards += 1;
                    let page_tally = sink.offer_all(&cards).await;
                    info!(
                        page = index,
                        added = page_tally.added,
                        skipped = page_tally.skipped,
                        "Page processed"
                    );
                    tally += page_tally;
                }
                Step::Done(reason) => break reason,
            }
        };

        info!(
            added = tally.added,
            skipped = tally.skipped,
            failed = tally.failed,
            pages = pages_with_cards,
            known = sink.known().len(),
            %stop_reason,
            "Run complete"
        );
        Ok(RunSummary {
            tally,
            pages_with_cards,
            stop_reason,
        })
    }
}
