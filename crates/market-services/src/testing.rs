//! Test harness wiring the services to in-memory adapters

use std::sync::Arc;

use market_core::{MarketSettings, MemoryLedger, MemoryNotifier, MemoryRecordStore};

use crate::MarketContext;

pub const OPERATOR: &str = "ops@example.com";

pub struct Harness {
    pub ctx: MarketContext,
    pub store: Arc<MemoryRecordStore>,
    pub ledger: Arc<MemoryLedger>,
    pub notifier: Arc<MemoryNotifier>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        let ledger = Arc::new(MemoryLedger::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let settings = MarketSettings {
            operator_email: Some(OPERATOR.into()),
            ..MarketSettings::default()
        };

        Self {
            ctx: MarketContext::new(store.clone(), ledger.clone(), notifier.clone(), settings),
            store,
            ledger,
            notifier,
        }
    }

    pub async fn field(&self, id: &str, name: &str) -> Option<serde_json::Value> {
        self.store.fields(id).await.and_then(|f| f.get(name).cloned())
    }
}
