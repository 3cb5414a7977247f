//! Structured-record store seam.
//!
//! The store is the only durable state of the job: every run rebuilds its
//! set of known article URLs from [`RecordStore::list_all_records`] and
//! writes new articles with [`RecordStore::create_record`].
//!
//! # Implementations
//!
//! | Store | Module | Notes |
//! |-------|--------|-------|
//! | Airtable | [`airtable`] | REST API v0, bearer token, offset pagination, paced by [`throttle`] |

pub mod airtable;
pub mod throttle;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Field map of one record, keyed by field id or field name.
pub type Fields = Map<String, Value>;

/// A record as returned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    /// The string value of field `key`, if present.
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("record store returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed record store response: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("missing record store credential")]
    MissingCredential,
}

/// The two operations the job needs from a table store.
pub trait RecordStore {
    /// Every record in the table.
    async fn list_all_records(&self) -> Result<Vec<Record>, StoreError>;

    /// Create one record with the given fields.
    async fn create_record(&self, fields: Fields) -> Result<(), StoreError>;
}
