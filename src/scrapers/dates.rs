//! Publication date extraction.
//!
//! Dates are looked up in priority order:
//!
//! 1. A machine-readable published-time field: `article:published_time` or
//!    `datePublished` meta content, or a `<time datetime>` attribute.
//! 2. A human-readable label such as `14 October 2025`.
//!
//! A missing or unparseable date is never an error: callers get `None` and
//! omit the field.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};
use tracing::debug;

static META_PUBLISHED: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("meta[property='article:published_time'], meta[itemprop='datePublished']")
        .expect("static selector")
});
static TIME_DATETIME: Lazy<Selector> =
    Lazy::new(|| Selector::parse("time[datetime]").expect("static selector"));
static DATE_LABEL: Lazy<Selector> = Lazy::new(|| {
    Selector::parse(".list-object__date, .story-card__date, .field--name-field-publishing-date, time")
        .expect("static selector")
});
static DAY_MONTH_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,9})\.?,?\s+(\d{4})\b").expect("static regex"));

/// Extract the publication date from anything below `scope`.
pub fn extract_date(scope: ElementRef<'_>) -> Option<NaiveDate> {
    machine_readable_date(scope).or_else(|| label_date(scope))
}

fn machine_readable_date(scope: ElementRef<'_>) -> Option<NaiveDate> {
    let meta = scope
        .select(&META_PUBLISHED)
        .filter_map(|el| el.value().attr("content"));
    let time = scope
        .select(&TIME_DATETIME)
        .filter_map(|el| el.value().attr("datetime"));
    meta.chain(time).find_map(parse_timestamp)
}

fn label_date(scope: ElementRef<'_>) -> Option<NaiveDate> {
    scope.select(&DATE_LABEL).find_map(|el| {
        let text = el.text().collect::<Vec<_>>().join(" ");
        parse_day_month_year(&text)
    })
}

/// Parse an ISO-8601 timestamp or plain date, accepting a trailing `Z`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return Some(dt.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.date());
        }
    }
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(e) => {
            debug!(%raw, error = %e, "Unparseable timestamp");
            None
        }
    }
}

/// Find and parse the first `D Month YYYY` date in a label's text.
pub fn parse_day_month_year(text: &str) -> Option<NaiveDate> {
    let caps = DAY_MONTH_YEAR.captures(text)?;
    let (day, month, year) = (&caps[1], &caps[2], &caps[3]);
    let candidate = format!("{day} {month} {year}");
    // "Sept" and similar four-letter forms only parse once cut to three letters.
    let abbreviated = format!("{day} {} {year}", &month[..3]);
    NaiveDate::parse_from_str(&candidate, "%d %B %Y")
        .or_else(|_| NaiveDate::parse_from_str(&abbreviated, "%d %b %Y"))
        .ok()
        .or_else(|| {
            debug!(text = %candidate, "Unparseable date label");
            None
        })
}
