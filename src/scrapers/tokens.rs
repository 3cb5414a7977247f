//! Pagination token resolution.
//!
//! The incremental-loading endpoint only serves further pages when the
//! request echoes back the identifiers of the view instance that rendered the
//! listing. Those identifiers change with every deployment, so they are
//! re-derived from the listing page on each run:
//!
//! 1. the embedded client settings JSON (`drupal-settings-json` script tag,
//!    or a `drupalSettings = {...}` / `jQuery.extend(Drupal.settings, {...})`
//!    assignment), looking up the `views.ajaxViews` entry whose `view_path`
//!    matches the feed;
//! 2. direct pattern matches against the raw page text;
//! 3. the configured defaults, with a warning.
//!
//! Each token is resolved independently, so a page that only reveals its DOM
//! id still gets a usable cursor.

use crate::config::FeedSettings;
use crate::models::ViewTokens;
use crate::utils::{Strategy, first_resolved};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

static SETTINGS_SCRIPT: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("script[data-drupal-selector='drupal-settings-json']").expect("static selector")
});
static INLINE_SCRIPT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script").expect("static selector"));

static SETTINGS_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)(?:drupalSettings\s*=|jQuery\.extend\(\s*Drupal\.settings\s*,)\s*(\{.*\})\s*\)?\s*;?")
        .expect("static regex")
});
static DOM_ID_CLASS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"js-view-dom-id-([0-9A-Za-z_-]+)").expect("static regex"));
static DOM_ID_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""view_dom_id"\s*:\s*"([^"]+)""#).expect("static regex"));
static LIBRARIES_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""libraries"\s*:\s*"([^"]+)""#).expect("static regex"));
static THEME_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""theme"\s*:\s*"([^"]+)""#).expect("static regex"));
static THEME_TOKEN_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""theme_token"\s*:\s*"([^"]*)""#).expect("static regex"));

/// The outcome of resolving a listing page.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub tokens: ViewTokens,
    /// Names of tokens that fell through to their configured default.
    pub defaulted: Vec<&'static str>,
}

impl Resolution {
    pub fn is_degraded(&self) -> bool {
        !self.defaulted.is_empty()
    }
}

/// The `ajaxViews` entry describing the feed, plus page-level asset state.
#[derive(Debug, Default)]
struct EmbeddedView {
    view_name: Option<String>,
    view_display_id: Option<String>,
    view_dom_id: Option<String>,
    view_args: Option<String>,
    view_base_path: Option<String>,
    pager_element: Option<u32>,
    theme: Option<String>,
    theme_token: Option<String>,
    libraries: Option<String>,
}

/// Resolve the pagination tokens from the listing page HTML.
#[instrument(level = "info", skip_all, fields(view_path = %feed.view_path))]
pub fn resolve(page_html: &str, feed: &FeedSettings) -> Resolution {
    let settings = embedded_settings(page_html);
    if settings.is_none() {
        warn!("No embedded client settings found; trying raw page patterns");
    }
    let view = settings
        .as_ref()
        .map(|s| embedded_view(s, &feed.view_path))
        .unwrap_or_default();

    let defaults = feed.default_tokens();
    let mut defaulted = Vec::new();
    let mut pick = |token: &'static str, embedded: Option<String>, pattern: &dyn Fn() -> Option<String>, default: &str| {
        let from_settings = || embedded.clone();
        let strategies = [
            Strategy { name: "settings", run: &from_settings },
            Strategy { name: "pattern", run: pattern },
        ];
        match first_resolved(&strategies) {
            Some((source, value)) => {
                debug!(token, source, %value, "Resolved token");
                value
            }
            None => {
                warn!(token, default, "Token not found on page; using default");
                defaulted.push(token);
                default.to_string()
            }
        }
    };

    let none = || None::<String>;
    let view_name = pick("view_name", view.view_name, &none, &defaults.view_name);
    let view_display_id = pick(
        "view_display_id",
        view.view_display_id,
        &none,
        &defaults.view_display_id,
    );
    let view_dom_id = pick(
        "view_dom_id",
        view.view_dom_id,
        &|| capture(&DOM_ID_CLASS, page_html).or_else(|| capture(&DOM_ID_FIELD, page_html)),
        &defaults.view_dom_id,
    );
    let theme = pick(
        "theme",
        view.theme,
        &|| capture(&THEME_FIELD, page_html),
        &defaults.theme,
    );
    let libraries = pick(
        "libraries",
        view.libraries,
        &|| capture(&LIBRARIES_FIELD, page_html),
        &defaults.libraries,
    );

    let tokens = ViewTokens {
        view_name,
        view_display_id,
        view_dom_id,
        view_path: feed.view_path.clone(),
        view_args: view.view_args.unwrap_or_default(),
        view_base_path: view.view_base_path.unwrap_or_default(),
        pager_element: view.pager_element.unwrap_or(0),
        theme,
        theme_token: view
            .theme_token
            .or_else(|| capture(&THEME_TOKEN_FIELD, page_html))
            .unwrap_or_default(),
        libraries,
    };

    let resolution = Resolution { tokens, defaulted };
    info!(
        view_name = %resolution.tokens.view_name,
        view_dom_id = %resolution.tokens.view_dom_id,
        degraded = resolution.is_degraded(),
        defaulted = ?resolution.defaulted,
        "Pagination tokens resolved"
    );
    resolution
}

fn capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .map(|caps| caps[1].to_string())
        .filter(|s| !s.is_empty())
}

/// Locate and parse the client settings blob embedded in the page.
fn embedded_settings(page_html: &str) -> Option<Value> {
    let document = Html::parse_document(page_html);

    let tagged = || {
        document
            .select(&SETTINGS_SCRIPT)
            .find_map(|script| parse_json(&script.text().collect::<String>()))
    };
    let assigned = || {
        document.select(&INLINE_SCRIPT).find_map(|script| {
            let body = script.text().collect::<String>();
            let caps = SETTINGS_ASSIGNMENT.captures(&body)?;
            parse_json(&caps[1])
        })
    };
    let strategies = [
        Strategy { name: "settings-json-tag", run: &tagged },
        Strategy { name: "settings-assignment", run: &assigned },
    ];
    first_resolved(&strategies).map(|(source, value)| {
        debug!(source, "Found embedded client settings");
        value
    })
}

fn parse_json(text: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(text.trim()) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Embedded settings are not valid JSON");
            None
        }
    }
}

fn embedded_view(settings: &Value, view_path: &str) -> EmbeddedView {
    let str_at = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);
    let page_state = settings.get("ajaxPageState");

    let mut view = EmbeddedView {
        theme: page_state.and_then(|s| str_at(s, "theme")),
        theme_token: page_state.and_then(|s| str_at(s, "theme_token")),
        libraries: page_state.and_then(|s| str_at(s, "libraries")),
        ..EmbeddedView::default()
    };

    let entry = settings
        .pointer("/views/ajaxViews")
        .and_then(Value::as_object)
        .and_then(|views| {
            views.values().find(|entry| {
                str_at(entry, "view_path")
                    .is_some_and(|p| p.trim_end_matches('/') == view_path.trim_end_matches('/'))
            })
        });

    match entry {
        Some(entry) => {
            view.view_name = str_at(entry, "view_name");
            view.view_display_id = str_at(entry, "view_display_id");
            view.view_dom_id = str_at(entry, "view_dom_id");
            view.view_args = str_at(entry, "view_args");
            view.view_base_path = str_at(entry, "view_base_path");
            view.pager_element = entry.get("pager_element").and_then(|p| match p {
                Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
                Value::String(s) => s.parse().ok(),
                _ => None,
            });
        }
        None => warn!(%view_path, "No ajaxViews entry matches the feed path"),
    }
    view
}
