//! Utility functions for URL canonicalization, log formatting, and ordered
//! fallback resolution.
//!
//! This module provides helper functions used throughout the application:
//! - URL normalization so tracking parameters never defeat deduplication
//! - String truncation for logging response bodies
//! - A "first successful strategy wins" combinator used by the token resolver

use url::Url;

/// Canonicalize an article URL to `scheme://host[:port]/path`.
///
/// The query string and fragment are discarded and trailing slashes are
/// stripped. Input that cannot be parsed as an absolute URL is still reduced
/// on a best-effort basis (query, fragment and trailing slashes removed), so
/// this function never fails.
///
/// Stripping *every* trailing slash keeps the function idempotent:
/// `normalize_url(normalize_url(u)) == normalize_url(u)` for any input.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(
///     normalize_url("https://x.edu/a/b/?ref=1#x"),
///     "https://x.edu/a/b"
/// );
/// ```
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    let canonical = match Url::parse(trimmed) {
        Ok(parsed) if parsed.has_host() => {
            let host = parsed.host_str().unwrap_or_default();
            match parsed.port() {
                Some(port) => format!("{}://{}:{}{}", parsed.scheme(), host, port, parsed.path()),
                None => format!("{}://{}{}", parsed.scheme(), host, parsed.path()),
            }
        }
        _ => {
            let end = trimmed.find(['?', '#']).unwrap_or(trimmed.len());
            trimmed[..end].to_string()
        }
    };
    canonical.trim_end_matches('/').to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a char boundary)
/// with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// One named way of producing a value; `None` means "not found here".
pub struct Strategy<'a, T> {
    /// Short label recorded in logs when this strategy wins.
    pub name: &'static str,
    /// The resolution attempt itself. Only run if every earlier strategy failed.
    pub run: &'a dyn Fn() -> Option<T>,
}

/// Try each strategy in order and return the first value produced, along
/// with the name of the strategy that produced it.
pub fn first_resolved<T>(strategies: &[Strategy<'_, T>]) -> Option<(&'static str, T)> {
    strategies
        .iter()
        .find_map(|strategy| (strategy.run)().map(|value| (strategy.name, value)))
}
