//! Service context
//!
//! Adapters are constructed once at startup and shared by every workflow.

use std::sync::Arc;

use market_core::ledger::Ledger;
use market_core::notify::{EmailMessage, Notifier, send_best_effort};
use market_core::store::{ListingPatch, RecordStore, StoreError};
use market_core::{Listing, MarketError, MarketSettings, Result};

use crate::notices;

/// Shared dependencies for the workflow services
#[derive(Clone)]
pub struct MarketContext {
    pub store: Arc<dyn RecordStore>,
    pub ledger: Arc<dyn Ledger>,
    pub notifier: Arc<dyn Notifier>,
    pub settings: MarketSettings,
}

impl MarketContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<dyn Ledger>,
        notifier: Arc<dyn Notifier>,
        settings: MarketSettings,
    ) -> Self {
        Self {
            store,
            ledger,
            notifier,
            settings,
        }
    }

    /// Load and normalize a listing
    pub async fn load_listing(&self, id: &str) -> Result<Listing> {
        let id = id.trim();
        if id.is_empty() {
            return Err(MarketError::BadRequest("Missing recordId".into()));
        }

        match self.store.get(id).await {
            Ok(record) => Ok(Listing::from_record(&record)),
            Err(StoreError::NotFound(_)) => Err(MarketError::NotFound(format!("Listing {id}"))),
            Err(e) => {
                tracing::error!(listing_id = %id, store = self.store.name(), error = %e, "Listing load failed");
                Err(e.into())
            }
        }
    }

    /// Merge a patch and return the updated listing
    pub async fn patch_listing(&self, id: &str, patch: &ListingPatch) -> Result<Listing> {
        match self.store.patch(id, patch).await {
            Ok(record) => Ok(Listing::from_record(&record)),
            Err(e) => {
                tracing::error!(listing_id = %id, store = self.store.name(), error = %e, "Listing patch failed");
                Err(e.into())
            }
        }
    }

    /// Best-effort email; never fails the caller
    pub async fn notify(&self, message: Option<EmailMessage>) -> bool {
        match message {
            Some(message) => send_best_effort(self.notifier.as_ref(), &message).await,
            None => false,
        }
    }

    /// Best-effort operator alert
    pub async fn alert_operator(&self, subject: &str, details: &[(&str, String)]) -> bool {
        self.notify(notices::operator_alert(&self.settings, subject, details)).await
    }
}
