//! Stripe Ledger
//!
//! Implementation of the core `Ledger` trait on `async-stripe`.
//! Every call is bounded by a timeout; a timed-out call is a transient failure.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use market_core::ledger::{
    AccountLink, CheckoutRequest, CheckoutSession, ConnectedAccount, Ledger, LedgerError, LedgerResult, Transfer,
    TransferRequest,
};
use stripe::{
    Account, AccountId, AccountLinkType, AccountType, CheckoutSession as StripeCheckoutSession, CheckoutSessionMode,
    Client, CreateAccount, CreateAccountCapabilities, CreateAccountCapabilitiesTransfers, CreateAccountLink,
    CreateCheckoutSession, CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, CreateTransfer, Currency, ListTransfers, RequestStrategy,
    StripeError,
};

const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// Stripe configuration
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl StripeConfig {
    /// Create from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> LedgerResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret_key = lookup("STRIPE_SECRET_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| LedgerError::Config("STRIPE_SECRET_KEY not set".into()))?;

        Ok(Self {
            secret_key,
            timeout_secs: lookup("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// Stripe-backed ledger
pub struct StripeLedger {
    client: Client,
    timeout: Duration,
}

impl StripeLedger {
    /// Create a new Stripe ledger
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            client: Client::new(config.secret_key.clone()),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> LedgerResult<Self> {
        Ok(Self::new(&StripeConfig::from_env()?))
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    async fn call<T, F>(&self, op: &'static str, request: F) -> LedgerResult<T>
    where
        F: Future<Output = Result<T, StripeError>> + Send,
    {
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let err = map_stripe_error(e);
                tracing::warn!(op, error = %err, retryable = err.is_retryable(), "Stripe call failed");
                Err(err)
            }
            Err(_) => {
                tracing::warn!(op, timeout_secs = self.timeout.as_secs(), "Stripe call timed out");
                Err(LedgerError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl Ledger for StripeLedger {
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> LedgerResult<CheckoutSession> {
        let currency = parse_currency(&request.item.currency)?;

        let mut params = CreateCheckoutSession::new();
        params.success_url = Some(&request.success_url);
        params.cancel_url = Some(&request.cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.metadata = Some(to_metadata(&request.metadata));
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency,
                unit_amount: Some(request.item.unit_amount),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: request.item.name.clone(),
                    description: request.item.description.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = self
            .call("create_checkout_session", StripeCheckoutSession::create(&self.client, params))
            .await?;

        let url = session.url.ok_or_else(|| LedgerError::Api {
            status: 502,
            message: "No checkout URL returned".into(),
        })?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            url,
        })
    }

    async fn create_transfer(&self, request: &TransferRequest) -> LedgerResult<Transfer> {
        let currency = parse_currency(&request.currency)?;

        let mut params = CreateTransfer::new(currency, request.destination.clone());
        params.amount = Some(request.amount);
        params.transfer_group = request.transfer_group.as_deref();
        params.metadata = Some(to_metadata(&request.metadata));

        let client = self
            .client
            .clone()
            .with_strategy(RequestStrategy::Idempotent(request.idempotency_key.clone()));

        let transfer = self.call("create_transfer", stripe::Transfer::create(&client, params)).await?;
        Ok(convert_transfer(&transfer))
    }

    async fn create_connected_account(
        &self,
        email: Option<&str>,
        display_name: Option<&str>,
    ) -> LedgerResult<ConnectedAccount> {
        let mut params = CreateAccount::new();
        params.type_ = Some(AccountType::Express);
        params.email = email;
        params.capabilities = Some(CreateAccountCapabilities {
            transfers: Some(CreateAccountCapabilitiesTransfers { requested: Some(true) }),
            ..Default::default()
        });
        params.metadata = display_name.map(|name| HashMap::from([("seller_name".to_string(), name.to_string())]));

        let account = self.call("create_account", Account::create(&self.client, params)).await?;
        Ok(ConnectedAccount {
            id: account.id.to_string(),
        })
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> LedgerResult<AccountLink> {
        let account: AccountId = account_id
            .parse()
            .map_err(|_| LedgerError::Rejected(format!("Invalid connected account id: {account_id}")))?;

        let mut params = CreateAccountLink::new(account, AccountLinkType::AccountOnboarding);
        params.refresh_url = Some(refresh_url);
        params.return_url = Some(return_url);

        let link = self
            .call("create_account_link", stripe::AccountLink::create(&self.client, params))
            .await?;

        Ok(AccountLink {
            url: link.url,
            expires_at: Some(link.expires_at),
        })
    }

    async fn list_transfers_by_group(&self, group: &str) -> LedgerResult<Vec<Transfer>> {
        let mut params = ListTransfers::new();
        params.transfer_group = Some(group);
        params.limit = Some(10);

        let list = self.call("list_transfers", stripe::Transfer::list(&self.client, &params)).await?;
        Ok(list.data.iter().map(convert_transfer).collect())
    }

    fn name(&self) -> &str {
        "stripe"
    }
}

fn parse_currency(code: &str) -> LedgerResult<Currency> {
    code.trim()
        .to_lowercase()
        .parse()
        .map_err(|_| LedgerError::Config(format!("Unsupported currency: {code}")))
}

fn to_metadata(map: &BTreeMap<String, String>) -> HashMap<String, String> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn convert_transfer(transfer: &stripe::Transfer) -> Transfer {
    Transfer {
        id: transfer.id.to_string(),
        amount: transfer.amount,
        currency: transfer.currency.to_string(),
        destination: transfer.destination.as_ref().map(|d| d.id().to_string()),
        transfer_group: transfer.transfer_group.clone(),
        metadata: BTreeMap::new(),
    }
}

fn map_stripe_error(err: StripeError) -> LedgerError {
    match err {
        StripeError::Stripe(request_error) => LedgerError::Api {
            status: request_error.http_status,
            message: request_error
                .message
                .clone()
                .unwrap_or_else(|| format!("{:?}", request_error.error_type)),
        },
        StripeError::ClientError(message) => LedgerError::Network(message),
        StripeError::Timeout => LedgerError::Network("timeout communicating with Stripe".into()),
        other => LedgerError::Rejected(other.to_string()),
    }
}
