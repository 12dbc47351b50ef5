//! Admin Authentication
//!
//! Admin endpoints accept either the shared secret or a short-lived signed
//! token, in `Authorization: Bearer <token>` or `X-Admin-Token`.
//!
//! Signed token format:
//!
//! ```text
//! base64url({"iat":..,"exp":..}) "." base64url(HMAC-SHA256(signing_secret, payload_b64))
//! ```

use std::fmt;

use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Alternate header for the admin token
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Signed token lifetime
pub const TOKEN_TTL_SECS: i64 = 30 * 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Admin authentication not configured")]
    NotConfigured,

    #[error("Missing passcode")]
    MissingPasscode,

    #[error("Invalid passcode")]
    InvalidPasscode,

    #[error("Unauthorized")]
    MissingToken,

    #[error("Unauthorized")]
    InvalidToken,

    #[error("Admin token expired")]
    Expired,
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::NotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::MissingPasscode => StatusCode::BAD_REQUEST,
            AuthError::InvalidPasscode | AuthError::MissingToken | AuthError::InvalidToken | AuthError::Expired => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotConfigured => "config_error",
            AuthError::MissingPasscode => "bad_request",
            _ => "unauthorized",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenClaims {
    iat: i64,
    exp: i64,
}

/// A freshly issued signed token
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    /// Unix seconds
    pub exp: i64,
}

/// Admin credentials
#[derive(Clone, Default)]
pub struct AdminAuth {
    shared_secret: Option<String>,
    signing_secret: Option<String>,
    login_passcode: Option<String>,
}

impl fmt::Debug for AdminAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminAuth")
            .field("shared_secret", &self.shared_secret.as_ref().map(|_| "<redacted>"))
            .field("signing_secret", &self.signing_secret.as_ref().map(|_| "<redacted>"))
            .field("login_passcode", &self.login_passcode.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AdminAuth {
    pub fn new(
        shared_secret: Option<String>,
        signing_secret: Option<String>,
        login_passcode: Option<String>,
    ) -> Self {
        let clean = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        Self {
            shared_secret: clean(shared_secret),
            signing_secret: clean(signing_secret),
            login_passcode: clean(login_passcode),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::new(
            lookup("ADMIN_SECRET_TOKEN"),
            lookup("ADMIN_TOKEN_SIGNING_SECRET"),
            lookup("ADMIN_LOGIN_PASSCODE"),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.shared_secret.is_some() || self.signing_secret.is_some()
    }

    /// Check the request's admin token
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        self.authorize_at(headers, Utc::now().timestamp())
    }

    pub fn authorize_at(&self, headers: &HeaderMap, now: i64) -> Result<(), AuthError> {
        if !self.is_configured() {
            return Err(AuthError::NotConfigured);
        }

        let token = token_from_headers(headers).ok_or(AuthError::MissingToken)?;

        if let Some(secret) = &self.shared_secret {
            if secret_matches(token, secret) {
                return Ok(());
            }
        }

        if self.signing_secret.is_some() && token.contains('.') {
            return self.verify_signed(token, now);
        }

        Err(AuthError::InvalidToken)
    }

    /// Exchange the login passcode for a signed token
    pub fn issue_token(&self, passcode: &str) -> Result<IssuedToken, AuthError> {
        self.issue_token_at(passcode, Utc::now().timestamp())
    }

    pub fn issue_token_at(&self, passcode: &str, now: i64) -> Result<IssuedToken, AuthError> {
        let passcode = passcode.trim();
        if passcode.is_empty() {
            return Err(AuthError::MissingPasscode);
        }

        let (Some(expected), Some(_)) = (&self.login_passcode, &self.signing_secret) else {
            return Err(AuthError::NotConfigured);
        };
        if !secret_matches(passcode, expected) {
            return Err(AuthError::InvalidPasscode);
        }

        let claims = TokenClaims {
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let json = serde_json::to_vec(&claims).map_err(|_| AuthError::NotConfigured)?;
        let payload_b64 = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload_b64)?.finalize().into_bytes());

        Ok(IssuedToken {
            token: format!("{payload_b64}.{signature}"),
            exp: claims.exp,
        })
    }

    fn verify_signed(&self, token: &str, now: i64) -> Result<(), AuthError> {
        let (payload_b64, signature_b64) = token.split_once('.').ok_or(AuthError::InvalidToken)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| AuthError::InvalidToken)?;

        self.mac(payload_b64)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::InvalidToken)?;

        let claims: TokenClaims = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .ok()
            .and_then(|raw| serde_json::from_slice(&raw).ok())
            .ok_or(AuthError::InvalidToken)?;

        if claims.exp <= now {
            return Err(AuthError::Expired);
        }
        Ok(())
    }

    fn mac(&self, payload_b64: &str) -> Result<HmacSha256, AuthError> {
        let secret = self.signing_secret.as_deref().ok_or(AuthError::NotConfigured)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::NotConfigured)?;
        mac.update(payload_b64.as_bytes());
        Ok(mac)
    }
}

fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
        });

    bearer
        .or_else(|| headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()).map(str::trim))
        .filter(|t| !t.is_empty())
}

/// Compare a presented credential with the configured one.
///
/// Both sides are reduced to HMAC tags keyed by the configured value and the
/// tags are compared with `verify_slice`.
fn secret_matches(presented: &str, expected: &str) -> bool {
    let Ok(mut expected_mac) = HmacSha256::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    let mut presented_mac = expected_mac.clone();

    expected_mac.update(expected.as_bytes());
    presented_mac.update(presented.as_bytes());
    presented_mac
        .verify_slice(&expected_mac.finalize().into_bytes())
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth() -> AdminAuth {
        AdminAuth::new(Some("shared".into()), Some("signing".into()), Some("letmein".into()))
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap());
        headers
    }

    #[test]
    fn test_shared_secret_accepted() {
        assert_eq!(auth().authorize(&bearer("shared")), Ok(()));

        let mut headers = HeaderMap::new();
        headers.insert(ADMIN_TOKEN_HEADER, HeaderValue::from_static("shared"));
        assert_eq!(auth().authorize(&headers), Ok(()));
    }

    #[test]
    fn test_missing_and_wrong_tokens() {
        assert_eq!(auth().authorize(&HeaderMap::new()), Err(AuthError::MissingToken));
        assert_eq!(auth().authorize(&bearer("nope")), Err(AuthError::InvalidToken));
        assert_eq!(auth().authorize(&bearer("nope.nope")), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_unconfigured_is_server_error() {
        let err = AdminAuth::default().authorize(&bearer("shared")).unwrap_err();
        assert_eq!(err, AuthError::NotConfigured);
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_signed_token_round_trip_and_expiry() {
        let auth = auth();
        let issued = auth.issue_token_at("letmein", 1_000).unwrap();
        assert_eq!(issued.exp, 1_000 + TOKEN_TTL_SECS);

        let headers = bearer(&issued.token);
        assert_eq!(auth.authorize_at(&headers, 1_500), Ok(()));
        assert_eq!(auth.authorize_at(&headers, issued.exp), Err(AuthError::Expired));
    }

    #[test]
    fn test_tampered_token_rejected() {
        let auth = auth();
        let issued = auth.issue_token_at("letmein", 1_000).unwrap();
        let (_, sig) = issued.token.split_once('.').unwrap();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"iat":1000,"exp":999999999}"#);

        let headers = bearer(&format!("{forged_payload}.{sig}"));
        assert_eq!(auth.authorize_at(&headers, 1_500), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_passcode_checks() {
        assert_eq!(auth().issue_token("wrong"), Err(AuthError::InvalidPasscode));
        assert_eq!(auth().issue_token(" "), Err(AuthError::MissingPasscode));
        assert_eq!(
            AdminAuth::new(Some("shared".into()), None, None).issue_token("letmein"),
            Err(AuthError::NotConfigured)
        );
    }

    #[test]
    fn test_secret_matches_exact_value_only() {
        assert!(secret_matches("shared", "shared"));
        assert!(!secret_matches("Shared", "shared"));
        assert!(!secret_matches("share", "shared"));
        assert!(!secret_matches("shared-and-more", "shared"));
        assert!(!secret_matches("", "shared"));
    }

    #[test]
    fn test_prefix_of_shared_secret_rejected() {
        assert_eq!(auth().authorize(&bearer("shar")), Err(AuthError::InvalidToken));
        assert_eq!(auth().authorize(&bearer("sharedx")), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_debug_redacts() {
        let rendered = format!("{:?}", auth());
        assert!(!rendered.contains("shared\""));
        assert!(!rendered.contains("letmein"));
    }
}
