//! Runtime settings.
//!
//! Settings come from three layers, lowest priority first: built-in defaults
//! (the values the INSEAD newsroom currently serves), an optional YAML file
//! passed with `--config`, and command-line flags or their environment
//! variables. Every YAML section is `#[serde(default)]`, so a file only needs
//! the keys it changes:
//!
//! ```yaml
//! feed:
//!   max_pages: 10
//!   delay_ms: 2000
//! store:
//!   table_id: tblLnvZF5bb6oj9ef
//! ```

use crate::cli::Cli;
use crate::models::ViewTokens;
use crate::store::throttle::RetryPolicy;
use serde::Deserialize;
use std::error::Error;
use std::time::Duration;
use tracing::{info, instrument};

const DEFAULT_LIBRARIES: &str = "eJx9Vu2WgygMfSGp77F_9wE4AVJlisSF2I7z9BvFflhpz5kzxXuvIMlNwIC9aCb5G1vzHOuf3JgPFOMvNwaZMWn8HSmj02cf5DG3MIkoT2bwHyUdRkwQGhPgb26NpxP8wG9jKVAy9Ns6PMMUuME_S5ExssbBoGvfnrXN-UXDPQ7YnqcQ1M077pXp1PLRXaIpuuYMFjm3Lk0jhFN5Otke7UWWXN7okOsil2h0dItfRfc9Vcmrx1tW6yYLoh0w6gSxw3YZqnXYnCkN7Mfc3geNj9lpiBBm9ja366OBKGtpS8NIUXZeFdkLOs-UdPDxkjVeRVifTnKJSSBRZvax0_eAfl-gzMtJIiwvVSUZIdn-u2Yl787YFLRxMhC5H4A9xY1L8mrANnMij69xbLavMgnS3L4-nGwQ-2kzMVPUveyS0vxFvrerznO0X9RdIAPhn_xFwjdEBhNQrYXzWVgMlseEcMG0Fya0kop_15AWZoQEXYKxz89UbZGrUqcoLtSZEm9bK9Pc0Cx20xjovwna8qNek4YgfqKELVj5cVsynqgTpwkIQa2m2JHFrHuIJBGDqjAWklODGBc-wKpL3h05Mj9o-YhL0PdgcfY21yLJVT4z8J5ZfHYAlI_jtF_23rpesVLye4iI3_ZeIPm0ONXwKyQP8mmSyh1d7LeDehjMlLraZL2MvkwmpdZVkNW2j5e4T_gmipJ3PK52wbkSysUj0kqlQUNKdHvjMteyWRLm7ZvzBuzguOwClAWO-xnIvUVrkHR59SyIBzHKu29IAB9rvh0TSbUNA8o80X0kI1x992hmD0HCjCwngBTWDi_ts5hMLSX6xtplJsWepbFY3pdMHkDOwcXhe5islzI9hGxpidJOa2FYu6X6VGZy0K-zqbCvNKm8fdbZD7i4pAoeP_TB9PJhf1KWb1l78FdcTgTZ07pigJkmllbvg6ShXa0q1wq9BevA36jCOp8tybxzK_UhfEPmPGW7nDQ4gA-PIn922ft5_0ROk6TNiJ97dM12EMLo9XI9WlpyQL5n-IA3JU16dX05aKUNSAxumGnA0_NgrgiP0Gm9GTV5zoyDNOSMzdU7pO0WdfYYXHu_fFUo8acsl_1Vor2QzXqdadf_JymoKWCBtI_ify9xyjZRCEWi7qgq6P833RZ2";

/// Complete settings for one run.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub feed: FeedSettings,
    pub store: StoreSettings,
    /// Path of the detailed DEBUG-level run log. Truncated at every start.
    pub log_file: Option<String>,
}

/// Where and how to crawl the newsroom feed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    /// Base URL relative links are resolved against.
    pub base_url: String,
    /// The initial listing page, fetched as plain HTML.
    pub listing_url: String,
    /// Path of the incremental-loading endpoint, relative to `base_url`.
    pub ajax_path: String,
    /// The view path the feed's AJAX descriptor is registered under.
    pub view_path: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    /// Pause before each incremental page request.
    pub delay_ms: u64,
    /// Cap on incremental page requests; 0 means no cap.
    pub max_pages: u32,
    /// Index of the first incremental page. The listing page itself is page 0.
    pub first_page: u32,
    /// Skip token resolution and use `fallback_tokens` as-is.
    pub static_tokens: bool,
    pub fallback_tokens: TokenDefaults,
}

/// Tokens used when the page does not reveal its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TokenDefaults {
    pub view_name: String,
    pub view_display_id: String,
    pub view_dom_id: String,
    pub theme: String,
    pub libraries: String,
}

/// The Airtable table articles are mirrored into.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub api_root: String,
    pub base_id: String,
    pub table_id: String,
    /// Field ids used when creating records.
    pub fields: FieldIds,
    /// Column name existing article URLs are read back from.
    pub article_url_column: String,
    pub timeout_secs: u64,
    /// Minimum spacing between record writes.
    pub write_interval_ms: u64,
    /// Retries of a request answered with HTTP 429.
    pub max_retries: u32,
    /// First rate-limit backoff; doubles per retry up to 30 seconds.
    pub retry_base_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FieldIds {
    pub title: String,
    pub publication_date: String,
    pub image_url: String,
    pub article_url: String,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "https://www.insead.edu".to_string(),
            listing_url: "https://www.insead.edu/newsroom/news?sort_by=field_publishing_date&sort_order=DESC&search_api_fulltext=".to_string(),
            ajax_path: "/views/ajax".to_string(),
            view_path: "/node/116796".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/136.0.0.0 Safari/537.36".to_string(),
            timeout_secs: 20,
            delay_ms: 2000,
            max_pages: 0,
            first_page: 1,
            static_tokens: false,
            fallback_tokens: TokenDefaults::default(),
        }
    }
}

impl Default for TokenDefaults {
    fn default() -> Self {
        Self {
            view_name: "insead_stories".to_string(),
            view_display_id: "insead_stories".to_string(),
            view_dom_id: "564c33262573b6ee5ad8d0673ea91d3d6b9012a98daa9de483dd48f5bcd240c0"
                .to_string(),
            theme: "insead_core".to_string(),
            libraries: DEFAULT_LIBRARIES.to_string(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            api_root: "https://api.airtable.com/v0".to_string(),
            base_id: "appoz4aD0Hjolycwd".to_string(),
            table_id: "tblLnvZF5bb6oj9ef".to_string(),
            fields: FieldIds::default(),
            article_url_column: "articleURL".to_string(),
            timeout_secs: 30,
            write_interval_ms: 200,
            max_retries: 5,
            retry_base_ms: 1000,
        }
    }
}

impl Default for FieldIds {
    fn default() -> Self {
        Self {
            title: "fldEhhyuhrKxmpjl0".to_string(),
            publication_date: "fldJZNPnajc0SHyh9".to_string(),
            image_url: "fldy48rpwvX54YoaU".to_string(),
            article_url: "fldUo3r63Cnh6exMR".to_string(),
        }
    }
}

impl FeedSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn ajax_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.ajax_path.trim_start_matches('/')
        )
    }

    /// The fallback defaults expanded into a complete token set.
    pub fn default_tokens(&self) -> ViewTokens {
        let d = &self.fallback_tokens;
        ViewTokens {
            view_name: d.view_name.clone(),
            view_display_id: d.view_display_id.clone(),
            view_dom_id: d.view_dom_id.clone(),
            view_path: self.view_path.clone(),
            view_args: String::new(),
            view_base_path: String::new(),
            pager_element: 0,
            theme: d.theme.clone(),
            theme_token: String::new(),
            libraries: d.libraries.clone(),
        }
    }
}

impl StoreSettings {
    pub fn write_interval(&self) -> Duration {
        Duration::from_millis(self.write_interval_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Parse settings from YAML text; missing keys keep their defaults.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Build the effective settings: defaults, then the `--config` file if
    /// given, then CLI overrides.
    #[instrument(level = "info", skip_all)]
    pub fn load(cli: &Cli) -> Result<Self, Box<dyn Error>> {
        let mut settings = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("cannot read config file {path}: {e}"))?;
                let parsed = Self::from_yaml_str(&text)
                    .map_err(|e| format!("invalid config file {path}: {e}"))?;
                info!(%path, "Loaded settings file");
                parsed
            }
            None => Self::default(),
        };
        settings.apply_cli(cli);
        Ok(settings)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(max_pages) = cli.max_pages {
            self.feed.max_pages = max_pages;
        }
        if let Some(delay_ms) = cli.delay_ms {
            self.feed.delay_ms = delay_ms;
        }
        if let Some(timeout_secs) = cli.timeout_secs {
            self.feed.timeout_secs = timeout_secs;
        }
        if cli.static_tokens {
            self.feed.static_tokens = true;
        }
        if let Some(base_id) = &cli.base_id {
            self.store.base_id = base_id.clone();
        }
        if let Some(table_id) = &cli.table_id {
            self.store.table_id = table_id.clone();
        }
        if let Some(log_file) = &cli.log_file {
            self.log_file = Some(log_file.clone());
        }
    }

    pub fn log_file(&self) -> &str {
        self.log_file.as_deref().unwrap_or("insead_news_sync.log")
    }
}
