//! # market-runtime
//!
//! Production adapters for the marketplace core.
//!
//! ## Adapters
//!
//! - **Airtable**: [`AirtableStore`] implements `RecordStore` over the Airtable REST API
//! - **MailerSend**: [`MailerSendNotifier`] implements `Notifier`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use market_runtime::{AirtableConfig, AirtableStore};
//!
//! let store = AirtableStore::new(AirtableConfig::from_env()?)?;
//! let record = store.get("recXXXXXXXXXXXXXX").await?;
//! ```

pub mod airtable;
pub mod mailersend;

pub use airtable::{AirtableConfig, AirtableStore};
pub use mailersend::{MailerSendConfig, MailerSendNotifier};

// Re-export core types for convenience
pub use market_core::{Notifier, RecordStore, StoreError};
