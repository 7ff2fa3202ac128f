//! JWT claims extraction
//!
//! The client never holds the signing key, so the payload is decoded
//! without signature verification. The server stays the authority on
//! validity; the claims are only used for expiry scheduling and display.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Raw JWT payload as issued by the backend
#[derive(Debug, Clone, Deserialize)]
struct RawClaims {
    sub: serde_json::Value,
    exp: i64,
    #[serde(default)]
    scopes: Vec<String>,
    #[serde(default, rename = "type")]
    token_type: Option<String>,
}

/// Claims derived from an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id or email, depending on the issuing endpoint)
    pub subject: String,
    /// Expiry instant
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// `access` or `refresh` when the server sets it
    #[serde(default)]
    pub token_type: Option<String>,
}

impl Claims {
    /// Decode the payload segment of a JWT.
    pub fn decode(token: &str) -> ClientResult<Self> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(ClientError::InvalidToken(
                "expected three dot-separated segments".into(),
            ));
        };

        // Some issuers keep the '=' padding
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| ClientError::InvalidToken(format!("payload is not base64url: {}", e)))?;

        let raw: RawClaims = serde_json::from_slice(&payload_bytes)
            .map_err(|e| ClientError::InvalidToken(format!("payload is not valid claims JSON: {}", e)))?;

        let subject = match raw.sub {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            other => {
                return Err(ClientError::InvalidToken(format!(
                    "unsupported 'sub' claim: {}",
                    other
                )))
            }
        };

        let expires_at = Utc
            .timestamp_opt(raw.exp, 0)
            .single()
            .ok_or_else(|| ClientError::InvalidToken(format!("'exp' out of range: {}", raw.exp)))?;

        Ok(Self {
            subject,
            expires_at,
            scopes: raw.scopes,
            token_type: raw.token_type,
        })
    }

    /// Time left before expiry; zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Build an unsigned token for tests (`header.payload.sig`)
#[cfg(test)]
pub(crate) fn test_token(sub: &str, exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": sub, "exp": exp, "type": "access" }).to_string(),
    );
    format!("{}.{}.signature", header, payload)
}
