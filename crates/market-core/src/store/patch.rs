//! Partial listing updates
//!
//! `status` can only be written through [`ListingPatch::transition`] or
//! [`ListingPatch::advance`], which consult the transition table.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::MarketError;
use crate::lifecycle::{can_advance, can_transition};
use crate::model::{ListingStatus, PayoutStatus, fields, format_timestamp};

/// A set of field changes merged into a record
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListingPatch {
    fields: Map<String, Value>,
}

impl ListingPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `status` along a single edge of the transition table
    pub fn transition(mut self, from: &ListingStatus, to: ListingStatus) -> Result<Self, MarketError> {
        if !can_transition(from, &to) {
            return Err(MarketError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        self.fields.insert(fields::STATUS.into(), Value::String(to.as_str().to_string()));
        Ok(self)
    }

    /// Move `status` along several consecutive edges in one write
    pub fn advance(mut self, from: &ListingStatus, path: &[ListingStatus]) -> Result<Self, MarketError> {
        let Some(target) = path.last() else {
            return Err(MarketError::IllegalTransition {
                from: from.to_string(),
                to: from.to_string(),
            });
        };
        if !can_advance(from, path) {
            return Err(MarketError::IllegalTransition {
                from: from.to_string(),
                to: target.to_string(),
            });
        }
        self.fields.insert(fields::STATUS.into(), Value::String(target.as_str().to_string()));
        Ok(self)
    }

    pub fn payout_status(self, status: &PayoutStatus) -> Self {
        self.put(fields::SELLER_PAYOUT_STATUS, status.as_str())
    }

    /// Set a non-status field
    pub fn set(self, field: &str, value: impl Into<Value>) -> Self {
        if field == fields::STATUS {
            tracing::warn!("status must be written through a checked transition; ignoring");
            return self;
        }
        self.put(field, value)
    }

    pub fn timestamp(self, field: &str, at: DateTime<Utc>) -> Self {
        self.set(field, format_timestamp(at))
    }

    /// Clear a field upstream
    pub fn clear(self, field: &str) -> Self {
        self.set(field, Value::Null)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    fn put(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }
}
