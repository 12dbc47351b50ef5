//! Marketplace settings
//!
//! Loaded once at startup and shared by every service.

use chrono::Duration;

use crate::error::{MarketError, Result};

const DEFAULT_SITE_URL: &str = "https://showroommarket.com";
const DEFAULT_HOLD_HOURS: i64 = 24;
const DEFAULT_CURRENCY: &str = "usd";

/// Site-wide settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MarketSettings {
    /// Public site origin, without trailing slash
    pub site_url: String,

    /// Fraud-prevention hold between payment and payout eligibility
    pub payout_hold: Duration,

    /// Recipient for dispute and anomaly alerts
    pub operator_email: Option<String>,

    /// Reply-to shown in buyer and seller emails
    pub support_email: Option<String>,

    /// Lowercase ISO currency code for checkouts and transfers
    pub currency: String,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.into(),
            payout_hold: Duration::hours(DEFAULT_HOLD_HOURS),
            operator_email: None,
            support_email: None,
            currency: DEFAULT_CURRENCY.into(),
        }
    }
}

impl MarketSettings {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let hold_hours = match get("PAYOUT_HOLD_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|h| *h >= 0)
                .ok_or_else(|| MarketError::Config(format!("PAYOUT_HOLD_HOURS must be a non-negative integer, got {raw:?}")))?,
            None => DEFAULT_HOLD_HOURS,
        };

        Ok(Self {
            site_url: get("SITE_URL")
                .unwrap_or_else(|| DEFAULT_SITE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            payout_hold: Duration::hours(hold_hours),
            operator_email: get("OPERATOR_EMAIL"),
            support_email: get("SUPPORT_EMAIL"),
            currency: get("PAYOUT_CURRENCY")
                .unwrap_or_else(|| DEFAULT_CURRENCY.into())
                .to_lowercase(),
        })
    }

    pub fn checkout_success_url(&self) -> String {
        self.page("success.html")
    }

    pub fn checkout_cancel_url(&self) -> String {
        self.page("cancel.html")
    }

    pub fn onboarding_refresh_url(&self) -> String {
        self.page("onboarding-refresh.html")
    }

    pub fn onboarding_return_url(&self) -> String {
        self.page("onboarding-return.html")
    }

    fn page(&self, path: &str) -> String {
        format!("{}/{path}", self.site_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = MarketSettings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, MarketSettings::default());
        assert_eq!(settings.checkout_success_url(), "https://showroommarket.com/success.html");
    }

    #[test]
    fn test_overrides() {
        let settings = MarketSettings::from_lookup(lookup(&[
            ("SITE_URL", "https://staging.example.com/"),
            ("PAYOUT_HOLD_HOURS", "48"),
            ("PAYOUT_CURRENCY", "CAD"),
            ("OPERATOR_EMAIL", "ops@example.com"),
        ]))
        .unwrap();

        assert_eq!(settings.payout_hold, Duration::hours(48));
        assert_eq!(settings.currency, "cad");
        assert_eq!(settings.onboarding_return_url(), "https://staging.example.com/onboarding-return.html");
        assert_eq!(settings.operator_email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn test_invalid_hold_hours() {
        let err = MarketSettings::from_lookup(lookup(&[("PAYOUT_HOLD_HOURS", "soon")])).unwrap_err();
        assert!(matches!(err, MarketError::Config(_)));
    }
}
