//! Scraping of the INSEAD newsroom feed.
//!
//! The feed is a Drupal view: the first page is ordinary HTML, and later
//! pages come from the `/views/ajax` endpoint as update commands that carry
//! HTML fragments. Each submodule handles one step:
//!
//! | Step | Module | Input | Output |
//! |------|--------|-------|--------|
//! | Fetch pages | [`feed`] | settings, transport | listing HTML, then fragments |
//! | Decode responses | [`ajax`] | JSON command list | the inserted fragment |
//! | Resolve tokens | [`tokens`] | listing HTML | view name, display id, DOM id |
//! | Parse cards | [`cards`] | HTML fragment | [`ArticleCard`](crate::models::ArticleCard)s |
//! | Extract dates | [`dates`] | card or page element | `NaiveDate` |
//!
//! Markup lookups are brittle by nature; every one of them walks a short
//! chain of selectors and treats "not found" as absence rather than error.

pub mod ajax;
pub mod cards;
pub mod dates;
pub mod feed;
pub mod tokens;
