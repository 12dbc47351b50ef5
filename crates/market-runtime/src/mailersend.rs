//! MailerSend Email Provider
//!
//! Implementation of `Notifier` for the MailerSend transactional email API.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use market_core::notify::{EmailMessage, Notifier, NotifyError};
use reqwest::Client;
use serde_json::{Value, json};

const DEFAULT_API_URL: &str = "https://api.mailersend.com/v1/email";
const DEFAULT_FROM_NAME: &str = "Showroom Market";
const DEFAULT_TIMEOUT_SECS: u64 = 20;

/// MailerSend configuration
#[derive(Clone)]
pub struct MailerSendConfig {
    pub api_key: String,
    /// Must be a verified sender in MailerSend
    pub from_email: String,
    pub from_name: String,
    pub reply_to: Option<String>,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for MailerSendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerSendConfig")
            .field("api_key", &"<redacted>")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .field("reply_to", &self.reply_to)
            .finish_non_exhaustive()
    }
}

impl MailerSendConfig {
    /// Create from environment variables; `None` when email is not configured
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let Some(api_key) = get("MAILERSEND_API_KEY") else {
            tracing::info!("MAILERSEND_API_KEY not set; email notifications disabled");
            return None;
        };
        let Some(from_email) = get("MAILERSEND_FROM_EMAIL") else {
            tracing::warn!("MAILERSEND_FROM_EMAIL not set; email notifications disabled");
            return None;
        };

        Some(Self {
            api_key,
            from_email,
            from_name: get("MAILERSEND_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.into()),
            reply_to: get("SUPPORT_EMAIL"),
            api_url: DEFAULT_API_URL.into(),
            timeout_secs: get("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

/// MailerSend-backed notifier
pub struct MailerSendNotifier {
    client: Client,
    config: MailerSendConfig,
}

impl MailerSendNotifier {
    pub fn new(config: MailerSendConfig) -> Result<Self, NotifyError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn payload(&self, message: &EmailMessage) -> Value {
        let mut body = json!({
            "from": { "email": self.config.from_email, "name": self.config.from_name },
            "to": [{ "email": message.to }],
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });

        if let Some(reply_to) = &self.config.reply_to {
            body["reply_to"] = json!({ "email": reply_to });
        }

        body
    }
}

#[async_trait]
impl Notifier for MailerSendNotifier {
    async fn send(&self, message: &EmailMessage) -> Result<(), NotifyError> {
        if !message.to.contains('@') {
            return Err(NotifyError::Invalid("recipient is not an email address".into()));
        }

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(message))
            .send()
            .await
            .map_err(|e| NotifyError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(NotifyError::Provider {
            status: status.as_u16(),
            message: body.chars().take(500).collect(),
        })
    }

    fn name(&self) -> &str {
        "mailersend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> MailerSendConfig {
        let env: HashMap<&str, &str> = [
            ("MAILERSEND_API_KEY", "mlsn.secret"),
            ("MAILERSEND_FROM_EMAIL", "orders@showroommarket.com"),
            ("SUPPORT_EMAIL", "help@showroommarket.com"),
        ]
        .into();
        MailerSendConfig::from_lookup(|k| env.get(k).map(|v| (*v).to_string())).unwrap()
    }

    #[test]
    fn test_missing_key_disables_email() {
        assert!(MailerSendConfig::from_lookup(|_| None).is_none());
    }

    #[test]
    fn test_defaults_and_redaction() {
        let config = config();
        assert_eq!(config.from_name, "Showroom Market");
        assert!(!format!("{config:?}").contains("mlsn.secret"));
    }

    #[test]
    fn test_payload_shape() {
        let notifier = MailerSendNotifier::new(config()).unwrap();
        let payload = notifier.payload(&EmailMessage::new("buyer@example.com", "Pickup", "<p>Hi</p>", "Hi"));

        assert_eq!(payload["from"]["email"], "orders@showroommarket.com");
        assert_eq!(payload["to"][0]["email"], "buyer@example.com");
        assert_eq!(payload["reply_to"]["email"], "help@showroommarket.com");
        assert_eq!(payload["text"], "Hi");
    }

    #[tokio::test]
    async fn test_rejects_non_address() {
        let notifier = MailerSendNotifier::new(config()).unwrap();
        let err = notifier
            .send(&EmailMessage::new("not-an-address", "x", "x", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::Invalid(_)));
    }
}
