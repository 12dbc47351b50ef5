//! Pickup Credentials
//!
//! Single-use pickup codes bound to a listing. Wire format:
//!
//! ```text
//! MKT|<listingId>|<token>
//! ```
//!
//! The payload is rendered into a QR image for the buyer and scanned at the
//! pickup desk.

use percent_encoding::percent_decode_str;
use rand::Rng;
use rand::distributions::Alphanumeric;
use thiserror::Error;

use crate::model::Listing;

/// Fixed marker identifying this marketplace's credentials
pub const CREDENTIAL_MARKER: &str = "MKT";

/// Length of freshly issued tokens
pub const TOKEN_LEN: usize = 28;

/// Shortest token accepted from a scan
pub const MIN_TOKEN_LEN: usize = 8;

const QR_IMAGE_ENDPOINT: &str = "https://api.qrserver.com/v1/create-qr-code/";

/// Why a scanned payload was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("Empty payload")]
    Empty,

    #[error("Expected 3 '|'-separated parts, got {0}")]
    WrongShape(usize),

    #[error("Unknown credential marker")]
    WrongMarker,

    #[error("Missing listing id")]
    MissingListingId,

    #[error("Token shorter than {MIN_TOKEN_LEN} characters")]
    TokenTooShort,
}

/// Credential issued to a buyer at payment time
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PickupCredential {
    pub listing_id: String,
    pub token: String,
}

impl PickupCredential {
    /// Issue a fresh high-entropy credential
    pub fn issue(listing_id: impl Into<String>) -> Self {
        let token = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        Self {
            listing_id: listing_id.into(),
            token,
        }
    }

    /// Rebuild a credential from a stored token
    pub fn from_token(listing_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            listing_id: listing_id.into(),
            token: token.into(),
        }
    }

    /// Wire payload: `MKT|<listingId>|<token>`
    pub fn payload(&self) -> String {
        format!("{CREDENTIAL_MARKER}|{}|{}", self.listing_id, self.token)
    }

    /// Link to a rendered QR image of the payload
    pub fn qr_image_url(&self) -> String {
        url::Url::parse_with_params(
            QR_IMAGE_ENDPOINT,
            &[("size", "320x320"), ("data", self.payload().as_str())],
        )
        .map(String::from)
        .unwrap_or_else(|_| QR_IMAGE_ENDPOINT.to_string())
    }
}

/// A payload read by the pickup-desk scanner
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedCredential {
    pub listing_id: String,
    pub token: String,
    /// Decoded, trimmed payload as scanned
    pub payload: String,
}

impl ScannedCredential {
    /// Parse a scanned payload. Percent-encoded payloads are decoded first.
    pub fn parse(scanned: &str) -> Result<Self, CredentialError> {
        let trimmed = scanned.trim();
        if trimmed.is_empty() {
            return Err(CredentialError::Empty);
        }

        let decoded = if trimmed.contains('%') {
            percent_decode(trimmed)
        } else {
            trimmed.to_string()
        };

        let parts: Vec<&str> = decoded.split('|').collect();
        let [marker, listing_id, token] = parts.as_slice() else {
            return Err(CredentialError::WrongShape(parts.len()));
        };

        if *marker != CREDENTIAL_MARKER {
            return Err(CredentialError::WrongMarker);
        }
        if listing_id.trim().is_empty() {
            return Err(CredentialError::MissingListingId);
        }
        if token.len() < MIN_TOKEN_LEN {
            return Err(CredentialError::TokenTooShort);
        }

        Ok(Self {
            listing_id: listing_id.trim().to_string(),
            token: (*token).to_string(),
            payload: decoded.clone(),
        })
    }

    /// Match against the listing's stored credential: either the token or the
    /// full payload may be what was stored.
    pub fn matches(&self, listing: &Listing) -> bool {
        let token_ok = listing
            .pickup_qr_token
            .as_deref()
            .is_some_and(|stored| stored == self.token);
        let payload_ok = listing
            .pickup_qr_payload
            .as_deref()
            .is_some_and(|stored| stored == self.payload);

        token_ok || payload_ok
    }
}

// Invalid UTF-8 after decoding leaves the payload as scanned
fn percent_decode(input: &str) -> String {
    percent_decode_str(input)
        .decode_utf8()
        .map_or_else(|_| input.to_string(), |decoded| decoded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Record;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn listing(token: Option<&str>, payload: Option<&str>) -> Listing {
        let mut fields = serde_json::Map::new();
        if let Some(t) = token {
            fields.insert("pickup_qr_token".into(), json!(t));
        }
        if let Some(p) = payload {
            fields.insert("pickup_qr_payload".into(), json!(p));
        }
        Listing::from_record(&Record::new("L1", fields))
    }

    #[test]
    fn test_issue_generates_unique_tokens() {
        let a = PickupCredential::issue("L1");
        let b = PickupCredential::issue("L1");
        assert_eq!(a.token.len(), TOKEN_LEN);
        assert_ne!(a.token, b.token);
        assert!(a.payload().starts_with("MKT|L1|"));
    }

    #[test]
    fn test_parse_valid_payload() {
        let scanned = ScannedCredential::parse(" MKT|L1|abcdef12 ").unwrap();
        assert_eq!(scanned.listing_id, "L1");
        assert_eq!(scanned.token, "abcdef12");
        assert_eq!(scanned.payload, "MKT|L1|abcdef12");
    }

    #[test]
    fn test_percent_decoding_keeps_reserved_characters() {
        let scanned = ScannedCredential::parse("MKT%7CL1%7Cab+cd=ef&gh%3D").unwrap();
        assert_eq!(scanned.listing_id, "L1");
        assert_eq!(scanned.token, "ab+cd=ef&gh=");
        assert_eq!(scanned.payload, "MKT|L1|ab+cd=ef&gh=");
    }

    #[test]
    fn test_undecodable_payload_kept_as_scanned() {
        assert_matches!(
            ScannedCredential::parse("MKT|L1|abcdef%FF"),
            Ok(ref c) if c.token == "abcdef%FF"
        );
    }

    #[test]
    fn test_parse_percent_encoded_payload() {
        let scanned = ScannedCredential::parse("MKT%7CL1%7Cabcdef12").unwrap();
        assert_eq!(scanned.payload, "MKT|L1|abcdef12");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_matches!(ScannedCredential::parse(""), Err(CredentialError::Empty));
        assert_matches!(ScannedCredential::parse("MKT|L1"), Err(CredentialError::WrongShape(2)));
        assert_matches!(ScannedCredential::parse("XYZ|L1|abcdef12"), Err(CredentialError::WrongMarker));
        assert_matches!(ScannedCredential::parse("MKT||abcdef12"), Err(CredentialError::MissingListingId));
        assert_matches!(ScannedCredential::parse("MKT|L1|short"), Err(CredentialError::TokenTooShort));
    }

    #[test]
    fn test_matches_token_or_payload() {
        let scanned = ScannedCredential::parse("MKT|L1|abcdef12").unwrap();

        assert!(scanned.matches(&listing(Some("abcdef12"), None)));
        assert!(scanned.matches(&listing(None, Some("MKT|L1|abcdef12"))));
        assert!(!scanned.matches(&listing(Some("zzzzzzzz"), Some("MKT|L1|zzzzzzzz"))));
        assert!(!scanned.matches(&listing(None, None)));
    }

    #[test]
    fn test_qr_image_url_encodes_payload() {
        let url = PickupCredential::from_token("L1", "abcdef12").qr_image_url();
        assert!(url.starts_with("https://api.qrserver.com/v1/create-qr-code/?size=320x320&data="));
        assert!(url.contains("MKT%7CL1%7Cabcdef12"));
    }
}
