//! Feed page parsing.
//!
//! Turns an HTML fragment (the initial listing page or an inserted AJAX
//! payload) into [`ArticleCard`]s. The "latest" and "archive" views of the
//! newsroom render slightly different markup, so every lookup walks a short
//! fallback chain of selectors.

use super::dates::extract_date;
use crate::models::ArticleCard;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

/// A card that had a link but could not be turned into an [`ArticleCard`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("cannot resolve link {href:?}: {reason}")]
    UnresolvableLink { href: String, reason: String },
}

pub type CardResult = Result<ArticleCard, ExtractError>;

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

static CARD: Lazy<Selector> = Lazy::new(|| selector("div.story-card-object"));
static ARCHIVE_CARD: Lazy<Selector> = Lazy::new(|| selector("article.list-object"));

static HEADING_LINK: Lazy<Selector> = Lazy::new(|| selector("h3.list-object__heading a[href]"));
static BODY_LINK: Lazy<Selector> = Lazy::new(|| selector(".list-object__body a[href]"));
static ANY_LINK: Lazy<Selector> = Lazy::new(|| selector("a[href]"));

static IMAGE_REGION: Lazy<Selector> =
    Lazy::new(|| selector("a.link--image-overlay, figure, .list-object__image"));
static PICTURE_IMG: Lazy<Selector> = Lazy::new(|| selector("picture img"));
static PLAIN_IMG: Lazy<Selector> = Lazy::new(|| selector("img"));

/// Parse every card in `document`.
///
/// The returned iterator is lazy and borrows the document; cards without any
/// link are skipped silently.
pub fn parse_cards<'a>(document: &'a Html, base: &'a Url) -> impl Iterator<Item = CardResult> + 'a {
    let card_selector: &Selector = if document.select(&CARD).next().is_some() {
        &CARD
    } else {
        &ARCHIVE_CARD
    };
    document
        .select(card_selector)
        .filter_map(move |card| parse_card(card, base))
}

/// Parse an HTML fragment and collect its cards.
pub fn cards_from_fragment(fragment: &str, base: &Url) -> Vec<CardResult> {
    let document = Html::parse_fragment(fragment);
    parse_cards(&document, base).collect()
}

/// Parse one card element; `None` when the card has no link at all.
pub fn parse_card(card: ElementRef<'_>, base: &Url) -> Option<CardResult> {
    let link = [&*HEADING_LINK, &*BODY_LINK, &*ANY_LINK]
        .into_iter()
        .find_map(|sel| card.select(sel).next());
    let Some(link) = link else {
        debug!("Card without link; skipping");
        return None;
    };

    let href = link.value().attr("href").unwrap_or_default().trim();
    let article_url = match base.join(href) {
        Ok(url) => url.to_string(),
        Err(e) => {
            return Some(Err(ExtractError::UnresolvableLink {
                href: href.to_string(),
                reason: e.to_string(),
            }));
        }
    };

    let title = link
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    Some(Ok(ArticleCard {
        title,
        article_url,
        image_url: image_url(card, base).unwrap_or_default(),
        publication_date: extract_date(card),
    }))
}

fn image_url(card: ElementRef<'_>, base: &Url) -> Option<String> {
    let region = card.select(&IMAGE_REGION).next()?;
    let img = region
        .select(&PICTURE_IMG)
        .next()
        .or_else(|| region.select(&PLAIN_IMG).next())?;

    let attrs = img.value();
    let src = attrs
        .attr("src")
        .filter(|s| !s.trim().is_empty())
        .or_else(|| attrs.attr("data-src").filter(|s| !s.trim().is_empty()))
        .or_else(|| {
            attrs
                .attr("srcset")
                .and_then(|set| set.split(',').next())
                .and_then(|candidate| candidate.split_whitespace().next())
        })?;
    base.join(src.trim()).ok().map(|url| url.to_string())
}
