//! Deduplicating sink: writes each article to the record store at most once.
//!
//! [`KnownUrls`] is rebuilt from the store at the start of every run and
//! grows as articles are accepted. Every comparison and every write uses the
//! normalized URL, so tracking parameters or a trailing slash never produce a
//! second record for the same article.

use crate::config::FieldIds;
use crate::models::{ArticleCard, BatchTally, Offer};
use crate::scrapers::cards::CardResult;
use crate::store::{Fields, Record, RecordStore};
use crate::utils::normalize_url;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, error, info, instrument};

/// Normalized article URLs already present in the store.
#[derive(Debug, Default, Clone)]
pub struct KnownUrls(HashSet<String>);

impl KnownUrls {
    /// Collect the URLs stored in `column` of every record.
    pub fn from_records(records: &[Record], column: &str) -> Self {
        Self(
            records
                .iter()
                .filter_map(|r| r.text(column))
                .filter(|url| !url.trim().is_empty())
                .map(normalize_url)
                .collect(),
        )
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains(&normalize_url(url))
    }

    /// Returns `true` if the URL was not yet known.
    pub fn insert(&mut self, url: &str) -> bool {
        self.0.insert(normalize_url(url))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Build the store fields for a card. The date field is omitted, not
/// nulled, when the date is unknown.
pub fn record_fields(card: &ArticleCard, article_url: &str, ids: &FieldIds) -> Fields {
    let mut fields = Fields::new();
    fields.insert(ids.title.clone(), Value::String(card.title.clone()));
    fields.insert(ids.image_url.clone(), Value::String(card.image_url.clone()));
    fields.insert(ids.article_url.clone(), Value::String(article_url.to_string()));
    if let Some(date) = card.publication_date {
        fields.insert(
            ids.publication_date.clone(),
            Value::String(date.format("%Y-%m-%d").to_string()),
        );
    }
    fields
}

/// The sink itself: a store, its field ids, and the known-URL set it owns.
pub struct DedupSink<'a, S> {
    store: &'a S,
    fields: &'a FieldIds,
    known: KnownUrls,
}

impl<'a, S: RecordStore> DedupSink<'a, S> {
    pub fn new(store: &'a S, fields: &'a FieldIds, known: KnownUrls) -> Self {
        Self {
            store,
            fields,
            known,
        }
    }

    pub fn known(&self) -> &KnownUrls {
        &self.known
    }

    /// Offer one card: skip it if known, otherwise write it.
    pub async fn offer(&mut self, card: &ArticleCard) -> Offer {
        let article_url = normalize_url(&card.article_url);
        if self.known.contains(&article_url) {
            debug!(url = %article_url, "Already recorded; skipping");
            return Offer::Skipped;
        }

        let fields = record_fields(card, &article_url, self.fields);
        match self.store.create_record(fields).await {
            Ok(()) => {
                self.known.insert(&article_url);
                info!(title = %card.title, url = %article_url, "Added article");
                Offer::Added
            }
            Err(e) => {
                error!(url = %article_url, error = %e, "Failed to record article");
                Offer::Failed(e.to_string())
            }
        }
    }

    /// Offer a batch of parsed cards in order and tally the outcomes.
    #[instrument(level = "info", skip_all, fields(cards = cards.len()))]
    pub async fn offer_all(&mut self, cards: &[CardResult]) -> BatchTally {
        let mut tally = BatchTally::default();
        for card in cards {
            let offer = match card {
                Ok(card) => self.offer(card).await,
                Err(e) => {
                    error!(error = %e, "Card extraction failed");
                    Offer::Failed(e.to_string())
                }
            };
            if let Offer::Failed(reason) = &offer {
                debug!(%reason, "Card dropped");
            }
            tally.record(&offer);
        }
        info!(
            added = tally.added,
            skipped = tally.skipped,
            failed = tally.failed,
            "Processed batch"
        );
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrapers::cards::ExtractError;
    use crate::store::tests::MemoryStore;
    use chrono::NaiveDate;

    fn ids() -> FieldIds {
        FieldIds::default()
    }

    fn card(url: &str, title: &str) -> ArticleCard {
        ArticleCard {
            title: title.to_string(),
            article_url: url.to_string(),
            image_url: String::new(),
            publication_date: None,
        }
    }

    #[test]
    fn test_known_urls_from_records_normalizes() {
        let store = MemoryStore::with_urls("articleURL", &["https://x.edu/a/?utm=1", "  "]);
        let known = KnownUrls::from_records(&store.records.borrow(), "articleURL");
        assert_eq!(known.len(), 1);
        assert!(known.contains("https://x.edu/a"));
        assert!(known.contains("https://x.edu/a/#frag"));
    }

    #[test]
    fn test_record_fields_omit_unknown_date() {
        let ids = ids();
        let fields = record_fields(&card("https://x.edu/a", "A"), "https://x.edu/a", &ids);
        assert_eq!(fields.len(), 3);
        assert!(!fields.contains_key(&ids.publication_date));

        let mut dated = card("https://x.edu/a", "A");
        dated.publication_date = NaiveDate::from_ymd_opt(2025, 6, 9);
        let fields = record_fields(&dated, "https://x.edu/a", &ids);
        assert_eq!(fields[&ids.publication_date], Value::String("2025-06-09".to_string()));
    }

    #[tokio::test]
    async fn test_known_url_is_skipped_without_write() {
        let store = MemoryStore::with_urls("articleURL", &["https://x.edu/a"]);
        let known = KnownUrls::from_records(&store.records.borrow(), "articleURL");
        let ids = ids();
        let mut sink = DedupSink::new(&store, &ids, known);

        let offer = sink.offer(&card("https://x.edu/a/?ref=feed", "A")).await;
        assert_eq!(offer, Offer::Skipped);
        assert!(store.writes.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_new_url_added_exactly_once() {
        let store = MemoryStore::default();
        let ids = ids();
        let mut sink = DedupSink::new(&store, &ids, KnownUrls::default());
        let c = card("https://x.edu/new/?utm=2", "New");

        assert_eq!(sink.offer(&c).await, Offer::Added);
        assert_eq!(sink.offer(&c).await, Offer::Skipped);

        let writes = store.writes.borrow();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0][&ids.article_url],
            Value::String("https://x.edu/new".to_string())
        );
        assert!(sink.known().contains("https://x.edu/new"));
    }

    #[tokio::test]
    async fn test_rejected_write_is_failed_and_not_remembered() {
        let ids = ids();
        let store = MemoryStore {
            reject_titles: vec!["Bad".to_string()],
            title_key: ids.title.clone(),
            ..MemoryStore::default()
        };
        let mut sink = DedupSink::new(&store, &ids, KnownUrls::default());

        let offer = sink.offer(&card("https://x.edu/bad", "Bad")).await;
        assert!(matches!(offer, Offer::Failed(reason) if reason.contains("422")));
        assert!(!sink.known().contains("https://x.edu/bad"));
    }

    #[tokio::test]
    async fn test_offer_all_continues_past_failures() {
        let ids = ids();
        let store = MemoryStore {
            reject_titles: vec!["Bad".to_string()],
            title_key: ids.title.clone(),
            ..MemoryStore::with_urls("articleURL", &["https://x.edu/old"])
        };
        let known = KnownUrls::from_records(&store.records.borrow(), "articleURL");
        let mut sink = DedupSink::new(&store, &ids, known);

        let cards = vec![
            Ok(card("https://x.edu/bad", "Bad")),
            Err(ExtractError::UnresolvableLink {
                href: "http://[::1".to_string(),
                reason: "invalid IPv6 address".to_string(),
            }),
            Ok(card("https://x.edu/old/", "Old")),
            Ok(card("https://x.edu/fresh", "Fresh")),
        ];
        let tally = sink.offer_all(&cards).await;
        assert_eq!(
            tally,
            BatchTally {
                added: 1,
                skipped: 1,
                failed: 2
            }
        );
        assert_eq!(store.writes.borrow().len(), 1);
    }
}
