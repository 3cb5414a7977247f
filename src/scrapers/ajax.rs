//! Decoding of the incremental endpoint's update-command responses.
//!
//! A response is a JSON array of commands. Only `insert` commands carry HTML:
//!
//! ```json
//! [{"command":"settings","settings":{}},
//!  {"command":"insert","method":"replaceWith","selector":".js-view-dom-id-ab12","data":"<div>…</div>"}]
//! ```
//!
//! Other commands (`settings`, `add_css`, `add_js`, …) may carry any JSON in
//! `data`; they are decoded but never used as a payload.
//!
//! When the endpoint is reached through an iframe transport the same array
//! arrives wrapped in a `<textarea>`; that wrapper is removed before giving up.

use crate::models::ViewTokens;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

static TEXTAREA: Lazy<Selector> =
    Lazy::new(|| Selector::parse("textarea").expect("static selector"));

/// Generic selectors accepted after the view-specific ones.
const GENERIC_SELECTORS: [&str; 2] = [".view-content", ".block-views"];

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateCommand {
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub selector: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl UpdateCommand {
    /// The HTML payload of an `insert` command; `None` for every other
    /// command and for inserts whose `data` is not a string.
    pub fn html(&self) -> Option<&str> {
        if self.command != "insert" {
            return None;
        }
        self.data.as_ref().and_then(Value::as_str)
    }
}

/// Decode a response body, directly or after unwrapping a `<textarea>`.
pub fn parse_commands(body: &str) -> Option<Vec<UpdateCommand>> {
    match serde_json::from_str::<Vec<UpdateCommand>>(body.trim()) {
        Ok(commands) => Some(commands),
        Err(e) => {
            debug!(error = %e, "Response is not a bare command list; trying textarea wrapper");
            let document = Html::parse_document(body);
            let inner = document
                .select(&TEXTAREA)
                .next()?
                .text()
                .collect::<String>();
            serde_json::from_str(inner.trim()).ok()
        }
    }
}

/// Selectors an insert command may target, most specific first.
pub fn accepted_selectors(tokens: &ViewTokens) -> Vec<String> {
    let mut selectors = vec![
        format!(".js-view-dom-id-{}", tokens.view_dom_id),
        format!(
            ".view-id-{}.view-display-id-{}",
            tokens.view_name, tokens.view_display_id
        ),
    ];
    selectors.extend(GENERIC_SELECTORS.iter().map(|s| s.to_string()));
    selectors
}

/// Pick the best-matching insert command that carries an HTML payload.
///
/// Selectors are tried in priority order; for each, the first insert command
/// targeting it wins.
pub fn select_insert<'c>(
    commands: &'c [UpdateCommand],
    accepted: &[String],
) -> Option<&'c UpdateCommand> {
    accepted.iter().find_map(|wanted| {
        commands.iter().find(|c| {
            c.html().is_some()
                && c.selector.as_deref().map(str::trim) == Some(wanted.as_str())
        })
    })
}
