//! # market-core
//!
//! Listing model, lifecycle rules and adapter contracts for the showroom
//! marketplace back end.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                         Services                              │
//! │  checkout · payment webhook · pickup · settlement · disputes  │
//! └──────────────┬───────────────────┬───────────────────┬───────┘
//!                │                   │                   │
//!        ┌───────▼──────┐    ┌───────▼──────┐    ┌───────▼──────┐
//!        │ RecordStore  │    │    Ledger    │    │   Notifier   │
//!        │  (Airtable)  │    │   (Stripe)   │    │ (MailerSend) │
//!        └──────────────┘    └──────────────┘    └──────────────┘
//! ```
//!
//! Every service works on the same listing record and consults the same
//! transition table in [`lifecycle`]. The adapter traits let the services run
//! against the in-memory implementations in tests and the HTTP ones in
//! production without changing workflow code.

pub mod credential;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod settings;
pub mod store;

pub use credential::{CredentialError, PickupCredential, ScannedCredential};
pub use error::{MarketError, Result};
pub use ledger::{Ledger, LedgerError, LedgerEvent, LedgerEventKind, LedgerResult, MemoryLedger};
pub use lifecycle::{PayoutBlock, can_transition, is_payout_allowed};
pub use model::{Listing, ListingStatus, PayoutStatus};
pub use notify::{DisabledNotifier, EmailMessage, MemoryNotifier, Notifier, NotifyError, send_best_effort};
pub use settings::MarketSettings;
pub use store::{ListingPatch, MemoryRecordStore, Record, RecordFilter, RecordQuery, RecordStore, StoreError};
