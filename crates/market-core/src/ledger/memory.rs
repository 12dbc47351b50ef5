//! In-memory ledger
//!
//! Collapses duplicate transfer idempotency keys the way the real provider
//! does, counts calls, and supports failure injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    AccountLink, CheckoutRequest, CheckoutSession, ConnectedAccount, Ledger, LedgerError, LedgerResult, Transfer,
    TransferRequest,
};

/// In-memory ledger for tests and local development
pub struct MemoryLedger {
    transfers: Mutex<Vec<Transfer>>,
    /// idempotency key -> transfer id
    keys: Mutex<HashMap<String, String>>,
    sessions: Mutex<Vec<CheckoutRequest>>,
    accounts: Mutex<Vec<ConnectedAccount>>,
    transfer_calls: AtomicUsize,
    lookup_calls: AtomicUsize,
    fail_transfers: AtomicBool,
    fail_lookups: AtomicBool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            transfers: Mutex::new(Vec::new()),
            keys: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            accounts: Mutex::new(Vec::new()),
            transfer_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            fail_transfers: AtomicBool::new(false),
            fail_lookups: AtomicBool::new(false),
        }
    }

    /// Record a transfer as if an earlier attempt created it
    pub async fn seed_transfer(&self, transfer: Transfer) {
        self.transfers.lock().await.push(transfer);
    }

    pub async fn transfers(&self) -> Vec<Transfer> {
        self.transfers.lock().await.clone()
    }

    pub async fn sessions(&self) -> Vec<CheckoutRequest> {
        self.sessions.lock().await.clone()
    }

    pub async fn accounts(&self) -> Vec<ConnectedAccount> {
        self.accounts.lock().await.clone()
    }

    pub fn set_fail_transfers(&self, fail: bool) {
        self.fail_transfers.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Number of create-transfer calls, including collapsed duplicates
    pub fn transfer_calls(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> LedgerResult<CheckoutSession> {
        let id = format!("cs_mem_{}", Uuid::new_v4().simple());
        self.sessions.lock().await.push(request.clone());

        Ok(CheckoutSession {
            url: format!("https://checkout.test/pay/{id}"),
            id,
        })
    }

    async fn create_transfer(&self, request: &TransferRequest) -> LedgerResult<Transfer> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_transfers.load(Ordering::SeqCst) {
            return Err(LedgerError::Api {
                status: 503,
                message: "injected transfer failure".into(),
            });
        }

        let mut keys = self.keys.lock().await;
        let mut transfers = self.transfers.lock().await;

        if let Some(existing_id) = keys.get(&request.idempotency_key) {
            if let Some(existing) = transfers.iter().find(|t| &t.id == existing_id) {
                return Ok(existing.clone());
            }
        }

        let transfer = Transfer {
            id: format!("tr_mem_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency.clone(),
            destination: Some(request.destination.clone()),
            transfer_group: request.transfer_group.clone(),
            metadata: request.metadata.clone(),
        };

        keys.insert(request.idempotency_key.clone(), transfer.id.clone());
        transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn create_connected_account(
        &self,
        _email: Option<&str>,
        _display_name: Option<&str>,
    ) -> LedgerResult<ConnectedAccount> {
        let account = ConnectedAccount {
            id: format!("acct_mem_{}", Uuid::new_v4().simple()),
        };
        self.accounts.lock().await.push(account.clone());
        Ok(account)
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> LedgerResult<AccountLink> {
        Ok(AccountLink {
            url: format!("https://connect.test/setup/{account_id}"),
            expires_at: None,
        })
    }

    async fn list_transfers_by_group(&self, group: &str) -> LedgerResult<Vec<Transfer>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(LedgerError::Network("injected lookup failure".into()));
        }

        let transfers = self.transfers.lock().await;
        Ok(transfers
            .iter()
            .filter(|t| t.transfer_group.as_deref() == Some(group))
            .cloned()
            .collect())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn request(amount: i64) -> TransferRequest {
        TransferRequest {
            amount,
            currency: "usd".into(),
            destination: "acct_1".into(),
            idempotency_key: super::super::transfer_idempotency_key("L1", "acct_1", amount),
            transfer_group: Some("listing_L1".into()),
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_keys_collapse() {
        let ledger = MemoryLedger::new();

        let first = ledger.create_transfer(&request(80_000)).await.unwrap();
        let second = ledger.create_transfer(&request(80_000)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(ledger.transfers().await.len(), 1);
        assert_eq!(ledger.transfer_calls(), 2);
    }

    #[tokio::test]
    async fn test_list_by_group() {
        let ledger = MemoryLedger::new();
        ledger.create_transfer(&request(80_000)).await.unwrap();

        assert_eq!(ledger.list_transfers_by_group("listing_L1").await.unwrap().len(), 1);
        assert!(ledger.list_transfers_by_group("listing_L2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let ledger = MemoryLedger::new();
        ledger.set_fail_transfers(true);

        let err = ledger.create_transfer(&request(80_000)).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(ledger.transfers().await.is_empty());
    }
}
