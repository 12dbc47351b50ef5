//! In-memory record store
//!
//! For tests and local development. Supports failure injection.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use super::{ListingPatch, Record, RecordQuery, RecordStore, StoreError, StoreResult};

/// In-memory record store
pub struct MemoryRecordStore {
    records: RwLock<BTreeMap<String, Map<String, Value>>>,
    patch_count: AtomicUsize,
    fail_patches: AtomicBool,
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            patch_count: AtomicUsize::new(0),
            fail_patches: AtomicBool::new(false),
        }
    }

    /// Seed or replace a record. Non-object values are stored as empty records.
    pub async fn insert(&self, id: impl Into<String>, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self.records.write().await.insert(id.into(), fields);
    }

    /// Current fields of a record
    pub async fn fields(&self, id: &str) -> Option<Map<String, Value>> {
        self.records.read().await.get(id).cloned()
    }

    /// Make subsequent patches fail with an upstream 503
    pub fn set_fail_patches(&self, fail: bool) {
        self.fail_patches.store(fail, Ordering::SeqCst);
    }

    /// Number of successful patches
    pub fn patch_count(&self) -> usize {
        self.patch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, id: &str) -> StoreResult<Record> {
        let records = self.records.read().await;
        records
            .get(id)
            .map(|fields| Record::new(id, fields.clone()))
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn patch(&self, id: &str, patch: &ListingPatch) -> StoreResult<Record> {
        if self.fail_patches.load(Ordering::SeqCst) {
            return Err(StoreError::Upstream {
                status: 503,
                message: "injected patch failure".into(),
            });
        }

        let mut records = self.records.write().await;
        let fields = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        for (key, value) in patch.fields() {
            if value.is_null() {
                fields.remove(key);
            } else {
                fields.insert(key.clone(), value.clone());
            }
        }

        self.patch_count.fetch_add(1, Ordering::SeqCst);
        Ok(Record::new(id, fields.clone()))
    }

    async fn query(&self, query: &RecordQuery) -> StoreResult<Vec<Record>> {
        let records = self.records.read().await;

        let mut matched: Vec<Record> = records
            .iter()
            .filter(|(_, fields)| query.filter.matches(fields))
            .map(|(id, fields)| Record::new(id.clone(), fields.clone()))
            .collect();

        matched.sort_by(|a, b| {
            query
                .sort
                .iter()
                .map(|s| s.compare(&a.fields, &b.fields))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some(max) = query.max_records {
            matched.truncate(max);
        }

        Ok(matched)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RecordFilter, Sort};
    use serde_json::json;

    #[tokio::test]
    async fn test_patch_merges_fields() {
        let store = MemoryRecordStore::new();
        store.insert("rec1", json!({"title": "Sofa", "payout_error": "boom"})).await;

        let patch = ListingPatch::new().set("locked", true).clear("payout_error");
        let record = store.patch("rec1", &patch).await.unwrap();

        assert_eq!(record.fields.get("title"), Some(&json!("Sofa")));
        assert_eq!(record.fields.get("locked"), Some(&json!(true)));
        assert!(!record.fields.contains_key("payout_error"));
        assert_eq!(store.patch_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_record() {
        let store = MemoryRecordStore::new();
        let err = store.get("nope").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_injected_failure_is_retryable() {
        let store = MemoryRecordStore::new();
        store.insert("rec1", json!({})).await;
        store.set_fail_patches(true);

        let err = store.patch("rec1", &ListingPatch::new().set("locked", true)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_query_filters_sorts_and_limits() {
        let store = MemoryRecordStore::new();
        store.insert("a", json!({"seller_payout_status": "Paid", "payout_sent_at": "2026-01-01T00:00:00Z"})).await;
        store.insert("b", json!({"seller_payout_status": "Paid", "payout_sent_at": "2026-03-01T00:00:00Z"})).await;
        store.insert("c", json!({"seller_payout_status": "Failed"})).await;

        let query = RecordQuery::new(RecordFilter::eq("seller_payout_status", "Paid"))
            .sorted_by(Sort::desc("payout_sent_at"))
            .limit(1);
        let records = store.query(&query).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "b");
    }
}
