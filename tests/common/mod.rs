//! Helpers shared by the integration tests

#![allow(dead_code)]

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use market_pulse::config::ApiConfig;

/// Unsigned JWT for `sub` expiring `secs_from_now` seconds from now
pub fn token_expiring_in(sub: &str, secs_from_now: i64) -> String {
    let exp = chrono::Utc::now().timestamp() + secs_from_now;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "sub": sub, "exp": exp, "type": "access" }).to_string(),
    );
    // Distinct signatures keep tokens with the same exp second apart
    format!("{}.{}.sig-{}", header, payload, uuid::Uuid::new_v4().simple())
}

pub fn api_config(base_url: &str, ws_base_url: &str) -> ApiConfig {
    ApiConfig {
        base_url: base_url.to_string(),
        ws_base_url: ws_base_url.to_string(),
        request_timeout_ms: 2_000,
    }
}

pub fn login_body(token: &str) -> String {
    serde_json::json!({
        "access_token": token,
        "token_type": "bearer",
        "user": {"id": 1, "username": "alice", "email": "alice@example.com"}
    })
    .to_string()
}
