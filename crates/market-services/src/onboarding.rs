//! Seller onboarding
//!
//! Gives a listing's seller a connected payout account and a hosted link to
//! finish setting it up.

use market_core::model::fields;
use market_core::store::ListingPatch;
use market_core::{MarketError, Result};
use serde::{Deserialize, Serialize};

use crate::MarketContext;

const ONBOARDING_IN_PROGRESS: &str = "In progress";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingRequest {
    pub record_id: String,
    #[serde(default)]
    pub seller_email: Option<String>,
    #[serde(default)]
    pub seller_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OnboardingLink {
    pub account_id: String,
    pub url: String,
    pub created_account: bool,
    pub expires_at: Option<i64>,
}

/// Reuse or create the seller's connected account and return an onboarding link
pub async fn start_onboarding(ctx: &MarketContext, request: &OnboardingRequest) -> Result<OnboardingLink> {
    let listing = ctx.load_listing(&request.record_id).await?;

    let seller_email = non_blank(request.seller_email.as_deref()).or(listing.seller_email.clone());
    let seller_name = non_blank(request.seller_name.as_deref()).or(listing.seller_name.clone());

    let (account_id, created_account) = match listing.stripe_account_id.clone() {
        Some(existing) => (existing, false),
        None => {
            let Some(email) = seller_email.as_deref() else {
                return Err(MarketError::BadRequest("Missing sellerEmail".into()));
            };
            let account = ctx
                .ledger
                .create_connected_account(Some(email), seller_name.as_deref())
                .await?;
            tracing::info!(listing_id = %listing.id, account_id = %account.id, "Connected account created");
            (account.id, true)
        }
    };

    let mut patch = ListingPatch::new()
        .set(fields::STRIPE_ACCOUNT_ID, account_id.clone())
        .set(fields::STRIPE_ONBOARDING_STATUS, ONBOARDING_IN_PROGRESS);
    if let Some(email) = non_blank(request.seller_email.as_deref()) {
        patch = patch.set(fields::SELLER_EMAIL, email);
    }
    if let Some(name) = non_blank(request.seller_name.as_deref()) {
        patch = patch.set(fields::SELLER_NAME, name);
    }
    ctx.patch_listing(&listing.id, &patch).await?;

    let link = ctx
        .ledger
        .create_account_link(
            &account_id,
            &ctx.settings.onboarding_refresh_url(),
            &ctx.settings.onboarding_return_url(),
        )
        .await?;

    Ok(OnboardingLink {
        account_id,
        url: link.url,
        created_account,
        expires_at: link.expires_at,
    })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use serde_json::json;

    fn request(email: Option<&str>) -> OnboardingRequest {
        OnboardingRequest {
            record_id: "L1".into(),
            seller_email: email.map(str::to_string),
            seller_name: Some("Ana".into()),
        }
    }

    #[tokio::test]
    async fn test_creates_account_and_link() {
        let h = Harness::new();
        h.store.insert("L1", json!({ "status": "Active" })).await;

        let link = start_onboarding(&h.ctx, &request(Some("ana@example.com"))).await.unwrap();
        assert!(link.created_account);
        assert_eq!(link.url, format!("https://connect.test/setup/{}", link.account_id));

        let f = h.store.fields("L1").await.unwrap();
        assert_eq!(f["stripe_account_id"], json!(link.account_id));
        assert_eq!(f["stripe_onboarding_status"], json!("In progress"));
        assert_eq!(f["seller_email"], json!("ana@example.com"));
        assert_eq!(f["seller_name"], json!("Ana"));
        assert_eq!(h.ledger.accounts().await.len(), 1);
    }

    #[tokio::test]
    async fn test_reuses_existing_account() {
        let h = Harness::new();
        h.store
            .insert("L1", json!({ "status": "Active", "stripe_account_id": "acct_existing" }))
            .await;

        let link = start_onboarding(&h.ctx, &request(None)).await.unwrap();
        assert!(!link.created_account);
        assert_eq!(link.account_id, "acct_existing");
        assert!(h.ledger.accounts().await.is_empty());
    }

    #[tokio::test]
    async fn test_new_account_requires_email() {
        let h = Harness::new();
        h.store.insert("L1", json!({ "status": "Active" })).await;

        let err = start_onboarding(&h.ctx, &request(None)).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(h.store.patch_count(), 0);
    }

    #[test]
    fn test_request_uses_camel_case() {
        let req: OnboardingRequest =
            serde_json::from_value(json!({ "recordId": "L1", "sellerEmail": "a@b.co" })).unwrap();
        assert_eq!(req.record_id, "L1");
        assert_eq!(req.seller_email.as_deref(), Some("a@b.co"));
        assert_eq!(req.seller_name, None);
    }
}
