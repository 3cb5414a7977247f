//! Airtable implementation of [`RecordStore`].
//!
//! Listing follows Airtable's `offset` cursor, one page of up to 100 records
//! per request, until the response carries no offset. Records are read back
//! with field *names* (Airtable's default), while writes use field *ids*, so
//! renaming a column never breaks inserts.
//!
//! Every request is retried on HTTP 429 and writes are spaced by
//! `write_interval_ms`; see [`super::throttle`].

use super::throttle::{RetryPolicy, WritePacer, retry_rate_limited};
use super::{Fields, Record, RecordStore, StoreError};
use crate::config::StoreSettings;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AirtableStore {
    client: Client,
    api_key: String,
    table_url: String,
    retry: RetryPolicy,
    pacer: WritePacer,
}

impl AirtableStore {
    pub fn new(api_key: &str, settings: &StoreSettings) -> Result<Self, StoreError> {
        if api_key.trim().is_empty() {
            return Err(StoreError::MissingCredential);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            table_url: table_url(settings),
            retry: settings.retry_policy(),
            pacer: WritePacer::new(settings.write_interval()),
        })
    }

    async fn check(response: reqwest::Response) -> Result<String, StoreError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StoreError::Status {
                status: status.as_u16(),
                body: truncate_for_log(&body, 300),
            });
        }
        Ok(body)
    }
}

fn table_url(settings: &StoreSettings) -> String {
    format!(
        "{}/{}/{}",
        settings.api_root.trim_end_matches('/'),
        settings.base_id,
        settings.table_id
    )
}

impl RecordStore for AirtableStore {
    #[instrument(level = "info", skip_all)]
    async fn list_all_records(&self) -> Result<Vec<Record>, StoreError> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", "100".to_string())];
            if let Some(o) = &offset {
                query.push(("offset", o.clone()));
            }
            let query = &query;
            let body = retry_rate_limited(&self.retry, || async move {
                let response = self
                    .client
                    .get(&self.table_url)
                    .bearer_auth(&self.api_key)
                    .query(query)
                    .send()
                    .await?;
                Self::check(response).await
            })
            .await?;
            let page: ListPage = serde_json::from_str(&body)?;
            debug!(count = page.records.len(), "Fetched record page");
            records.extend(page.records);

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        info!(count = records.len(), "Listed records");
        Ok(records)
    }

    #[instrument(level = "debug", skip_all)]
    async fn create_record(&self, fields: Fields) -> Result<(), StoreError> {
        let payload = json!({ "fields": fields });
        let payload = &payload;
        self.pacer.wait().await;
        retry_rate_limited(&self.retry, || async move {
            let response = self
                .client
                .post(&self.table_url)
                .bearer_auth(&self.api_key)
                .json(payload)
                .send()
                .await?;
            Self::check(response).await
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_url() {
        let settings = StoreSettings {
            api_root: "https://api.airtable.com/v0/".to_string(),
            base_id: "appX".to_string(),
            table_id: "tblY".to_string(),
            ..StoreSettings::default()
        };
        assert_eq!(table_url(&settings), "https://api.airtable.com/v0/appX/tblY");
    }

    #[test]
    fn test_rate_limit_settings_flow_into_store() {
        let settings = StoreSettings {
            max_retries: 2,
            retry_base_ms: 500,
            write_interval_ms: 250,
            ..StoreSettings::default()
        };
        let store = AirtableStore::new("pat123", &settings).unwrap();
        assert_eq!(store.retry.max_retries, 2);
        assert_eq!(store.retry.delay_for(2), Duration::from_secs(1));
        assert_eq!(settings.write_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_blank_key_is_missing_credential() {
        let result = AirtableStore::new("  ", &StoreSettings::default());
        assert!(matches!(result, Err(StoreError::MissingCredential)));
    }

    #[test]
    fn test_list_page_deserializes_with_and_without_offset() {
        let page: ListPage = serde_json::from_str(
            r#"{"records":[{"id":"rec1","createdTime":"2025-01-01T00:00:00.000Z","fields":{"articleURL":"https://x.edu/a"}}],"offset":"itrA/rec1"}"#,
        )
        .unwrap();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.offset.as_deref(), Some("itrA/rec1"));

        let last: ListPage = serde_json::from_str(r#"{"records":[]}"#).unwrap();
        assert!(last.offset.is_none());
    }
}
