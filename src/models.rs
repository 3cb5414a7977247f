//! Data models shared across the pipeline.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ArticleCard`]: One article summary scraped from a feed page
//! - [`ViewTokens`] and [`FeedCursor`]: Pagination state for one run
//! - [`Offer`] and [`BatchTally`]: Per-card outcomes and their aggregate
//! - [`StopReason`] and [`RunSummary`]: How and why a run ended

use chrono::NaiveDate;
use std::fmt;
use std::ops::AddAssign;

/// One article's summary block as rendered on a feed page.
///
/// `article_url` is absolute but not necessarily canonical when produced by
/// the parser; the sink normalizes it before any comparison or write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCard {
    /// The link text of the card's title link; empty if the link text is blank.
    pub title: String,
    /// Absolute URL of the article.
    pub article_url: String,
    /// Absolute URL of the card image, or empty when the card has none.
    pub image_url: String,
    /// Publication date, present only when one could be parsed.
    pub publication_date: Option<NaiveDate>,
}

/// The identifiers the incremental-loading endpoint needs to serve more
/// pages of the same view instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewTokens {
    pub view_name: String,
    pub view_display_id: String,
    /// The DOM anchor id (`view_dom_id`) the server echoes back in its
    /// insert command selector.
    pub view_dom_id: String,
    pub view_path: String,
    pub view_args: String,
    pub view_base_path: String,
    pub pager_element: u32,
    pub theme: String,
    pub theme_token: String,
    /// The asset-library token (`ajax_page_state[libraries]`).
    pub libraries: String,
}

/// Session-scoped pagination state.
///
/// The tokens are fixed once the cursor is created; only the page index
/// moves, and it only moves forward.
#[derive(Debug, Clone)]
pub struct FeedCursor {
    tokens: ViewTokens,
    page_index: u32,
}

impl FeedCursor {
    pub fn new(tokens: ViewTokens, first_page: u32) -> Self {
        Self {
            tokens,
            page_index: first_page,
        }
    }

    pub fn tokens(&self) -> &ViewTokens {
        &self.tokens
    }

    pub fn page_index(&self) -> u32 {
        self.page_index
    }

    /// Move to the next page. Called after every attempt, successful or not.
    pub fn advance(&mut self) {
        self.page_index += 1;
    }

    /// Query parameters for the incremental endpoint at the current page.
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let t = &self.tokens;
        vec![
            ("_wrapper_format", "drupal_ajax".to_string()),
            ("view_name", t.view_name.clone()),
            ("view_display_id", t.view_display_id.clone()),
            ("view_args", t.view_args.clone()),
            ("view_path", t.view_path.clone()),
            ("view_base_path", t.view_base_path.clone()),
            ("view_dom_id", t.view_dom_id.clone()),
            ("pager_element", t.pager_element.to_string()),
            ("page", self.page_index.to_string()),
            ("_drupal_ajax", "1".to_string()),
            ("ajax_page_state[theme]", t.theme.clone()),
            ("ajax_page_state[theme_token]", t.theme_token.clone()),
            ("ajax_page_state[libraries]", t.libraries.clone()),
        ]
    }
}

/// What happened to a single card offered to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Offer {
    /// A new record was written to the store.
    Added,
    /// The canonical URL was already known; nothing was written.
    Skipped,
    /// Extraction or the store write failed; the card was dropped.
    Failed(String),
}

/// Aggregated outcomes of a batch of offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub added: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchTally {
    pub fn record(&mut self, offer: &Offer) {
        match offer {
            Offer::Added => self.added += 1,
            Offer::Skipped => self.skipped += 1,
            Offer::Failed(_) => self.failed += 1,
        }
    }
}

impl AddAssign for BatchTally {
    fn add_assign(&mut self, rhs: Self) {
        self.added += rhs.added;
        self.skipped += rhs.skipped;
        self.failed += rhs.failed;
    }
}

/// Why pagination stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The response carried no insert command for any accepted selector.
    NoMatchingInsert,
    /// The inserted fragment contained no cards.
    NoCards,
    /// The response body was not a command list, even after unwrapping.
    UnparseableResponse,
    /// The configured page cap was reached.
    PageLimit,
    /// Transport failure or non-success status.
    FetchFailed(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoMatchingInsert => write!(f, "no matching insert command"),
            StopReason::NoCards => write!(f, "page contained no cards"),
            StopReason::UnparseableResponse => write!(f, "unparseable response"),
            StopReason::PageLimit => write!(f, "page limit reached"),
            StopReason::FetchFailed(e) => write!(f, "fetch failed: {e}"),
        }
    }
}

/// Final result of one synchronization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub tally: BatchTally,
    /// Pages that produced cards, the initial page included.
    pub pages_with_cards: u32,
    pub stop_reason: StopReason,
}
