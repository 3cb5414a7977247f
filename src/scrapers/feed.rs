//! Incremental feed fetching.
//!
//! [`IncrementalFetcher`] drives the feed through its states:
//!
//! ```text
//! INIT ──▶ FETCHING ──▶ HAS_DATA ──▶ FETCHING …
//!              │
//!              ├──▶ EMPTY ──▶ DONE   (no insert, no cards, unparseable body, page cap)
//!              └──▶ ERROR ──▶ DONE   (transport failure, non-success status)
//! ```
//!
//! `INIT` fetches the listing page directly and resolves the pagination
//! tokens from it. Every later page goes through the incremental endpoint,
//! one request at a time, with a politeness pause before each request. Once
//! `DONE` the fetcher yields nothing more; a failed page is never retried.

use super::ajax::{accepted_selectors, parse_commands, select_insert};
use super::cards::{CardResult, cards_from_fragment};
use super::tokens;
use crate::config::FeedSettings;
use crate::models::{FeedCursor, StopReason};
use crate::utils::truncate_for_log;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, REFERER};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
    #[error("invalid URL {0}")]
    InvalidUrl(String),
}

/// The two feed endpoints.
pub trait FeedTransport {
    /// Fetch the listing page as plain HTML.
    async fn fetch_listing(&self) -> Result<String, FetchError>;

    /// Fetch one incremental page for `cursor`'s current page index.
    async fn fetch_incremental(&self, cursor: &FeedCursor) -> Result<String, FetchError>;
}

/// [`FeedTransport`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeed {
    client: Client,
    listing_url: String,
    ajax_url: String,
}

impl HttpFeed {
    pub fn new(feed: &FeedSettings) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        let referer = HeaderValue::from_str(&feed.listing_url)
            .map_err(|_| FetchError::InvalidUrl(feed.listing_url.clone()))?;
        headers.insert(REFERER, referer);

        let client = Client::builder()
            .user_agent(feed.user_agent.clone())
            .default_headers(headers)
            .timeout(feed.timeout())
            .build()?;

        Ok(Self {
            client,
            listing_url: feed.listing_url.clone(),
            ajax_url: feed.ajax_url(),
        })
    }

    async fn get_text(&self, request: reqwest::RequestBuilder, url: &str) -> Result<String, FetchError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(%url, status = status.as_u16(), "Feed response");
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(response.text().await?)
    }
}

impl FeedTransport for HttpFeed {
    #[instrument(level = "debug", skip_all, fields(url = %self.listing_url))]
    async fn fetch_listing(&self) -> Result<String, FetchError> {
        self.get_text(self.client.get(&self.listing_url), &self.listing_url)
            .await
    }

    #[instrument(level = "debug", skip_all, fields(page = cursor.page_index()))]
    async fn fetch_incremental(&self, cursor: &FeedCursor) -> Result<String, FetchError> {
        let request = self.client.get(&self.ajax_url).query(&cursor.query());
        self.get_text(request, &self.ajax_url).await
    }
}

/// Result of one incremental step.
#[derive(Debug)]
pub enum Step {
    /// A page with at least one card.
    Page { index: u32, cards: Vec<CardResult> },
    /// Pagination has ended; no further requests will be made.
    Done(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Fetching,
    Done(StopReason),
}

/// Session-scoped pager over the feed.
pub struct IncrementalFetcher<'a, F> {
    transport: &'a F,
    base: Url,
    cursor: FeedCursor,
    accepted: Vec<String>,
    delay: Duration,
    max_pages: u32,
    requested: u32,
    state: State,
}

impl<'a, F: FeedTransport> IncrementalFetcher<'a, F> {
    /// Fetch the listing page, parse its cards and resolve the cursor.
    ///
    /// Fails only when the listing page itself cannot be fetched; token
    /// resolution always produces a cursor, falling back to defaults.
    #[instrument(level = "info", skip_all)]
    pub async fn init(
        transport: &'a F,
        feed: &FeedSettings,
    ) -> Result<(Self, Vec<CardResult>), FetchError> {
        let base = Url::parse(&feed.base_url)
            .map_err(|_| FetchError::InvalidUrl(feed.base_url.clone()))?;

        let html = transport.fetch_listing().await?;
        info!(bytes = html.len(), "Fetched listing page");

        let cards = cards_from_fragment(&html, &base);
        let tokens = if feed.static_tokens {
            info!("Using static pagination tokens");
            feed.default_tokens()
        } else {
            tokens::resolve(&html, feed).tokens
        };
        info!(count = cards.len(), "Parsed listing page cards");

        let accepted = accepted_selectors(&tokens);
        let fetcher = Self {
            transport,
            base,
            cursor: FeedCursor::new(tokens, feed.first_page),
            accepted,
            delay: feed.delay(),
            max_pages: feed.max_pages,
            requested: 0,
            state: State::Fetching,
        };
        Ok((fetcher, cards))
    }

    pub fn cursor(&self) -> &FeedCursor {
        &self.cursor
    }

    /// Request the next incremental page.
    ///
    /// Returns [`Step::Done`] with the same reason on every call once the
    /// feed has ended.
    pub async fn next_page(&mut self) -> Step {
        if let State::Done(reason) = &self.state {
            return Step::Done(reason.clone());
        }
        if self.max_pages > 0 && self.requested >= self.max_pages {
            return self.finish(StopReason::PageLimit);
        }

        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }

        let index = self.cursor.page_index();
        info!(page = index, "Requesting incremental page");
        let outcome = self.transport.fetch_incremental(&self.cursor).await;
        self.requested += 1;
        self.cursor.advance();

        let body = match outcome {
            Ok(body) => body,
            Err(e) => {
                error!(page = index, error = %e, "Incremental page fetch failed");
                return self.finish(StopReason::FetchFailed(e.to_string()));
            }
        };

        match self.decode(&body) {
            Ok(cards) => {
                info!(page = index, count = cards.len(), "Found article cards");
                Step::Page { index, cards }
            }
            Err(reason) => {
                if reason == StopReason::UnparseableResponse {
                    warn!(page = index, preview = %truncate_for_log(&body, 200), "Unparseable incremental response");
                }
                self.finish(reason)
            }
        }
    }

    fn decode(&self, body: &str) -> Result<Vec<CardResult>, StopReason> {
        let commands = parse_commands(body).ok_or(StopReason::UnparseableResponse)?;
        debug!(commands = commands.len(), "Decoded update commands");
        let insert =
            select_insert(&commands, &self.accepted).ok_or(StopReason::NoMatchingInsert)?;
        debug!(selector = ?insert.selector, method = ?insert.method, "Matched insert command");
        let cards = cards_from_fragment(insert.html().unwrap_or_default(), &self.base);
        if cards.is_empty() {
            return Err(StopReason::NoCards);
        }
        Ok(cards)
    }

    fn finish(&mut self, reason: StopReason) -> Step {
        info!(%reason, requested = self.requested, "Pagination finished");
        self.state = State::Done(reason.clone());
        Step::Done(reason)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// Scripted transport: a fixed listing page and a queue of incremental
    /// responses. Records the page index of every incremental request.
    pub(crate) struct ScriptedFeed {
        pub listing: Result<String, u16>,
        pub pages: RefCell<VecDeque<Result<String, u16>>>,
        pub requested: RefCell<Vec<u32>>,
    }

    impl ScriptedFeed {
        pub fn new(listing: &str, pages: Vec<Result<String, u16>>) -> Self {
            Self {
                listing: Ok(listing.to_string()),
                pages: RefCell::new(pages.into()),
                requested: RefCell::new(Vec::new()),
            }
        }
    }

    fn status(code: u16) -> FetchError {
        FetchError::Status {
            status: code,
            url: "test://feed".to_string(),
        }
    }

    impl FeedTransport for ScriptedFeed {
        async fn fetch_listing(&self) -> Result<String, FetchError> {
            self.listing.clone().map_err(status)
        }

        async fn fetch_incremental(&self, cursor: &FeedCursor) -> Result<String, FetchError> {
            self.requested.borrow_mut().push(cursor.page_index());
            self.pages
                .borrow_mut()
                .pop_front()
                .unwrap_or(Err(404))
                .map_err(status)
        }
    }

    pub(crate) fn test_settings() -> FeedSettings {
        FeedSettings {
            delay_ms: 0,
            ..FeedSettings::default()
        }
    }

    pub(crate) fn card_html(slug: &str) -> String {
        format!(
            r#"<div class="story-card-object"><h3 class="list-object__heading"><a href="/news/{slug}">Story {slug}</a></h3></div>"#
        )
    }

    pub(crate) fn listing_page(dom_id: &str, cards: &[&str]) -> String {
        let body: String = cards.iter().map(|c| card_html(c)).collect();
        format!(
            r#"<html><head><script type="application/json" data-drupal-selector="drupal-settings-json">
            {{"ajaxPageState":{{"theme":"insead_core","libraries":"L"}},
              "views":{{"ajaxViews":{{"views_dom_id:{dom_id}":{{"view_name":"insead_stories","view_display_id":"insead_stories","view_path":"/node/116796","view_dom_id":"{dom_id}","pager_element":0}}}}}}}}
            </script></head><body><div class="js-view-dom-id-{dom_id}">{body}</div></body></html>"#
        )
    }

    pub(crate) fn ajax_page(selector: &str, cards: &[&str]) -> String {
        let fragment: String = cards.iter().map(|c| card_html(c)).collect();
        serde_json::json!([
            {"command": "settings", "settings": {}},
            {"command": "insert", "method": "replaceWith", "selector": selector, "data": fragment}
        ])
        .to_string()
    }

    #[tokio::test]
    async fn test_init_resolves_cursor_and_parses_listing() {
        let feed = ScriptedFeed::new(&listing_page("dom1", &["a", "b"]), vec![]);
        let (fetcher, cards) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();
        assert_eq!(cards.len(), 2);
        assert_eq!(fetcher.cursor().tokens().view_dom_id, "dom1");
        assert_eq!(fetcher.cursor().page_index(), 1);
    }

    #[tokio::test]
    async fn test_init_fails_when_listing_fails() {
        let feed = ScriptedFeed {
            listing: Err(503),
            pages: RefCell::new(VecDeque::new()),
            requested: RefCell::new(Vec::new()),
        };
        let result = IncrementalFetcher::init(&feed, &test_settings()).await;
        assert!(matches!(result, Err(FetchError::Status { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_pages_until_empty_and_stays_done() {
        let feed = ScriptedFeed::new(
            &listing_page("dom1", &["a"]),
            vec![
                Ok(ajax_page(".js-view-dom-id-dom1", &["b", "c"])),
                Ok(ajax_page(".js-view-dom-id-dom1", &[])),
            ],
        );
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();

        match fetcher.next_page().await {
            Step::Page { index, cards } => {
                assert_eq!(index, 1);
                assert_eq!(cards.len(), 2);
            }
            other => panic!("expected page, got {other:?}"),
        }
        assert!(matches!(fetcher.next_page().await, Step::Done(StopReason::NoCards)));
        assert!(matches!(fetcher.next_page().await, Step::Done(StopReason::NoCards)));
        assert_eq!(*feed.requested.borrow(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_asset_commands_do_not_hide_insert() {
        let fragment = format!("{}{}", card_html("b"), card_html("c"));
        let body = serde_json::json!([
            {"command": "settings", "settings": {}, "merge": true},
            {"command": "add_css", "data": [{"rel": "stylesheet", "href": "/x.css", "media": "all"}]},
            {"command": "add_js", "selector": "body", "data": [{"src": "/x.js"}]},
            {"command": "insert", "method": "replaceWith", "selector": ".js-view-dom-id-dom1", "data": fragment}
        ])
        .to_string();
        let feed = ScriptedFeed::new(&listing_page("dom1", &["a"]), vec![Ok(body)]);
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();
        match fetcher.next_page().await {
            Step::Page { index, cards } => {
                assert_eq!(index, 1);
                assert_eq!(cards.len(), 2);
            }
            other => panic!("expected page, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_precedes_each_request() {
        let feed = ScriptedFeed::new(
            &listing_page("dom1", &["a"]),
            vec![
                Ok(ajax_page(".js-view-dom-id-dom1", &["b"])),
                Ok(ajax_page(".js-view-dom-id-dom1", &["c"])),
            ],
        );
        let settings = FeedSettings {
            delay_ms: 2000,
            ..test_settings()
        };
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &settings).await.unwrap();

        let start = tokio::time::Instant::now();
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
        assert!(start.elapsed() >= Duration::from_millis(2000));
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
        assert!(start.elapsed() >= Duration::from_millis(4000));
        assert_eq!(*feed.requested.borrow(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_page_limit_skips_delay() {
        let feed = ScriptedFeed::new(
            &listing_page("dom1", &["a"]),
            vec![Ok(ajax_page(".js-view-dom-id-dom1", &["b"]))],
        );
        let settings = FeedSettings {
            delay_ms: 2000,
            max_pages: 1,
            ..test_settings()
        };
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &settings).await.unwrap();
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
        let after_request = tokio::time::Instant::now();
        assert!(matches!(fetcher.next_page().await, Step::Done(StopReason::PageLimit)));
        assert_eq!(after_request.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_no_matching_insert_is_done() {
        let feed = ScriptedFeed::new(
            &listing_page("dom1", &["a"]),
            vec![Ok(ajax_page("#unrelated", &["b"]))],
        );
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();
        assert!(matches!(
            fetcher.next_page().await,
            Step::Done(StopReason::NoMatchingInsert)
        ));
    }

    #[tokio::test]
    async fn test_unparseable_body_is_done() {
        let feed = ScriptedFeed::new(
            &listing_page("dom1", &["a"]),
            vec![Ok("<html>Checking your browser</html>".to_string())],
        );
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();
        assert!(matches!(
            fetcher.next_page().await,
            Step::Done(StopReason::UnparseableResponse)
        ));
    }

    #[tokio::test]
    async fn test_status_error_ends_pagination() {
        let feed = ScriptedFeed::new(&listing_page("dom1", &["a"]), vec![Err(500)]);
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &test_settings()).await.unwrap();
        match fetcher.next_page().await {
            Step::Done(StopReason::FetchFailed(msg)) => assert!(msg.contains("500")),
            other => panic!("expected fetch failure, got {other:?}"),
        }
        assert_eq!(fetcher.cursor().page_index(), 2);
        assert_eq!(feed.requested.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_page_limit_caps_requests() {
        let pages = (0..5)
            .map(|i| Ok(ajax_page(".js-view-dom-id-dom1", &[format!("p{i}").as_str()])))
            .collect();
        let feed = ScriptedFeed::new(&listing_page("dom1", &["a"]), pages);
        let settings = FeedSettings {
            max_pages: 2,
            ..test_settings()
        };
        let (mut fetcher, _) = IncrementalFetcher::init(&feed, &settings).await.unwrap();
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
        assert!(matches!(fetcher.next_page().await, Step::Done(StopReason::PageLimit)));
        assert_eq!(feed.requested.borrow().len(), 2);
    }

    #[tokio::test]
    async fn test_unresolvable_tokens_still_complete_init() {
        let listing = format!("<html><body>{}</body></html>", card_html("only"));
        let feed = ScriptedFeed::new(
            &listing,
            vec![Ok(ajax_page(
                ".js-view-dom-id-564c33262573b6ee5ad8d0673ea91d3d6b9012a98daa9de483dd48f5bcd240c0",
                &["next"],
            ))],
        );
        let settings = test_settings();
        let (mut fetcher, cards) = IncrementalFetcher::init(&feed, &settings).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(fetcher.cursor().tokens(), &settings.default_tokens());
        assert!(matches!(fetcher.next_page().await, Step::Page { .. }));
    }

    #[tokio::test]
    async fn test_static_tokens_skip_resolution() {
        let feed = ScriptedFeed::new(&listing_page("dom1", &["a"]), vec![]);
        let settings = FeedSettings {
            static_tokens: true,
            ..test_settings()
        };
        let (fetcher, _) = IncrementalFetcher::init(&feed, &settings).await.unwrap();
        assert_eq!(
            fetcher.cursor().tokens().view_dom_id,
            settings.fallback_tokens.view_dom_id
        );
    }
}
