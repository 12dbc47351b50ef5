//! Record Store
//!
//! Contract for the listing record store. Records are opaque field maps;
//! writes are partial-field merges so unrelated concurrent updates do not
//! clobber each other.

mod filter;
mod memory;
mod patch;

pub use filter::{RecordFilter, RecordQuery, Sort, SortDirection};
pub use memory::MemoryRecordStore;
pub use patch::ListingPatch;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Result type alias for record-store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Record-store errors
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// No record with this id
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Upstream rejected the request
    #[error("Record store error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Transport failure
    #[error("Record store unreachable: {0}")]
    Network(String),

    /// Request exceeded its deadline
    #[error("Record store timed out after {0}s")]
    Timeout(u64),

    /// Response body could not be decoded
    #[error("Record store response invalid: {0}")]
    Decode(String),

    /// Adapter misconfigured
    #[error("Record store configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// 5xx, rate limiting and transport failures are retryable; 4xx are not
    pub fn is_retryable(&self) -> bool {
        match self {
            StoreError::Upstream { status, .. } => *status >= 500 || *status == 429,
            StoreError::Network(_) | StoreError::Timeout(_) => true,
            StoreError::NotFound(_) | StoreError::Decode(_) | StoreError::Config(_) => false,
        }
    }
}

/// A raw record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    #[serde(default)]
    pub fields: Map<String, Value>,

    #[serde(rename = "createdTime", default, skip_serializing_if = "Option::is_none")]
    pub created_time: Option<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
            created_time: None,
        }
    }
}

/// Record-store trait
///
/// Implement this for each backend: Airtable, in-memory, etc.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load a single record
    async fn get(&self, id: &str) -> StoreResult<Record>;

    /// Merge the patch into the record and return the updated record
    async fn patch(&self, id: &str, patch: &ListingPatch) -> StoreResult<Record>;

    /// Run a query, following continuation cursors until exhausted
    async fn query(&self, query: &RecordQuery) -> StoreResult<Vec<Record>>;

    /// Backend name for logging
    fn name(&self) -> &str;
}
