//! Airtable Record Store
//!
//! Implementation of `RecordStore` over the Airtable REST API.
//! Writes use `PATCH`, which merges fields instead of replacing the record.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use market_core::store::{ListingPatch, Record, RecordQuery, RecordStore, StoreError, StoreResult};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";
const DEFAULT_TABLE: &str = "Listings";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Airtable configuration
#[derive(Clone)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub table: String,
    /// Optional view applied to queries
    pub view: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
}

// Keeps the API key out of logs
impl fmt::Debug for AirtableConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AirtableConfig")
            .field("api_key", &"<redacted>")
            .field("base_id", &self.base_id)
            .field("table", &self.table)
            .field("view", &self.view)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl AirtableConfig {
    pub fn new(api_key: impl Into<String>, base_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_id: base_id.into(),
            table: DEFAULT_TABLE.into(),
            view: None,
            api_url: DEFAULT_API_URL.into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get("AIRTABLE_API_KEY")
            .or_else(|| get("AIRTABLE_TOKEN"))
            .ok_or_else(|| StoreError::Config("AIRTABLE_API_KEY not set".into()))?;
        let base_id = get("AIRTABLE_BASE_ID").ok_or_else(|| StoreError::Config("AIRTABLE_BASE_ID not set".into()))?;

        Ok(Self {
            api_key,
            base_id,
            table: get("AIRTABLE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.into()),
            view: get("AIRTABLE_VIEW"),
            api_url: DEFAULT_API_URL.into(),
            timeout_secs: get("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// Airtable-backed record store
pub struct AirtableStore {
    client: Client,
    config: AirtableConfig,
}

#[derive(Deserialize)]
struct Page {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

impl AirtableStore {
    /// Create from configuration
    pub fn new(config: AirtableConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Create from environment variables
    pub fn from_env() -> StoreResult<Self> {
        Self::new(AirtableConfig::from_env()?)
    }

    pub fn config(&self) -> &AirtableConfig {
        &self.config
    }

    fn table_url(&self) -> StoreResult<Url> {
        let mut url = Url::parse(&self.config.api_url).map_err(|e| StoreError::Config(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Config(format!("Invalid Airtable API URL: {}", self.config.api_url)))?
            .pop_if_empty()
            .push(&self.config.base_id)
            .push(&self.config.table);
        Ok(url)
    }

    fn record_url(&self, id: &str) -> StoreResult<Url> {
        let mut url = self.table_url()?;
        url.path_segments_mut()
            .map_err(|()| StoreError::Config("Invalid Airtable API URL".into()))?
            .push(id);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder, record_id: Option<&str>) -> StoreResult<Value> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(&e))?;

        if status == StatusCode::NOT_FOUND {
            if let Some(id) = record_id {
                return Err(StoreError::NotFound(id.to_string()));
            }
        }

        if !status.is_success() {
            return Err(StoreError::Upstream {
                status: status.as_u16(),
                message: error_message(&body, status),
            });
        }

        serde_json::from_str(&body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    fn transport_error(&self, err: &reqwest::Error) -> StoreError {
        if err.is_timeout() {
            StoreError::Timeout(self.config.timeout_secs)
        } else {
            StoreError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl RecordStore for AirtableStore {
    async fn get(&self, id: &str) -> StoreResult<Record> {
        let url = self.record_url(id)?;
        let body = self.send(self.client.get(url), Some(id)).await?;
        serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn patch(&self, id: &str, patch: &ListingPatch) -> StoreResult<Record> {
        let url = self.record_url(id)?;
        let request = self.client.patch(url).json(&json!({ "fields": patch.fields() }));

        tracing::debug!(record_id = %id, fields = patch.fields().len(), "Airtable PATCH");

        let body = self.send(request, Some(id)).await?;
        serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn query(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let url = self.table_url()?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let params = query_params(query, self.config.view.as_deref(), offset.as_deref());
            let body = self.send(self.client.get(url.clone()).query(&params), None).await?;
            let page: Page = serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))?;

            records.extend(page.records);

            if let Some(max) = query.max_records {
                if records.len() >= max {
                    records.truncate(max);
                    break;
                }
            }

            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        tracing::debug!(table = %self.config.table, count = records.len(), "Airtable query complete");
        Ok(records)
    }

    fn name(&self) -> &str {
        "airtable"
    }
}

/// Query-string parameters for a list request
fn query_params(query: &RecordQuery, view: Option<&str>, offset: Option<&str>) -> Vec<(String, String)> {
    let mut params = vec![("pageSize".to_string(), query.page_size.clamp(1, 100).to_string())];

    if let Some(formula) = query.filter.to_formula() {
        params.push(("filterByFormula".into(), formula));
    }
    if let Some(max) = query.max_records {
        params.push(("maxRecords".into(), max.to_string()));
    }
    if let Some(view) = view {
        params.push(("view".into(), view.to_string()));
    }
    for (i, sort) in query.sort.iter().enumerate() {
        params.push((format!("sort[{i}][field]"), sort.field.clone()));
        params.push((format!("sort[{i}][direction]"), sort.direction.as_str().to_string()));
    }
    if let Some(offset) = offset {
        params.push(("offset".into(), offset.to_string()));
    }

    params
}

/// Best available message from an Airtable error body
fn error_message(body: &str, status: StatusCode) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|v| {
        let error = v.get("error")?;
        error
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| error.as_str())
            .or_else(|| error.get("type").and_then(Value::as_str))
            .map(str::to_string)
    });

    from_json
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string())
}
