//! Shared REST plumbing: client construction and response decoding

use std::time::Duration;

use reqwest::header::RETRY_AFTER;
use serde::de::DeserializeOwned;

use crate::error::{ClientError, ClientResult};

/// Build the reqwest client used for REST calls
pub fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Read a response body, mapping non-success statuses onto `ClientError`.
pub async fn read_body(response: reqwest::Response, timeout_ms: u64) -> ClientResult<String> {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let text = response
        .text()
        .await
        .map_err(|e| ClientError::from_transport(e, timeout_ms))?;

    if !status.is_success() {
        return Err(ClientError::from_status(status.as_u16(), &text, retry_after));
    }

    Ok(text)
}

/// Read and deserialize a JSON response body
pub async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
    timeout_ms: u64,
) -> ClientResult<T> {
    let text = read_body(response, timeout_ms).await?;
    decode_json(&text)
}

/// Deserialize a body; an empty body reads as JSON `null`
pub fn decode_json<T: DeserializeOwned>(text: &str) -> ClientResult<T> {
    let text = if text.trim().is_empty() { "null" } else { text };
    serde_json::from_str(text).map_err(|e| {
        let preview: String = text.chars().take(200).collect();
        ClientError::InvalidResponse(format!("Invalid JSON: {} - {}", e, preview))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, serde::Deserialize, PartialEq)]
    struct Ack {
        message: String,
    }

    #[test]
    fn test_decode_json_valid() {
        let ack: Ack = decode_json(r#"{"message":"ok"}"#).unwrap();
        assert_eq!(ack.message, "ok");
    }

    #[test]
    fn test_decode_json_empty_body_is_null() {
        decode_json::<()>("").unwrap();
        let opt: Option<Ack> = decode_json("  ").unwrap();
        assert!(opt.is_none());
    }

    #[test]
    fn test_decode_json_invalid() {
        let err = decode_json::<Ack>("<html>").unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_read_body_maps_status_and_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/limited")
            .with_status(429)
            .with_header("retry-after", "12")
            .with_body(r#"{"detail":"Too many requests"}"#)
            .create_async()
            .await;

        let client = build_http_client(Duration::from_secs(5));
        let response = client
            .get(format!("{}/limited", server.url()))
            .send()
            .await
            .unwrap();

        match read_body(response, 5_000).await {
            Err(ClientError::RateLimited { message, retry_after_secs }) => {
                assert_eq!(message, "Too many requests");
                assert_eq!(retry_after_secs, Some(12));
            }
            other => panic!("Expected RateLimited, got {:?}", other),
        }
        mock.assert_async().await;
    }
}
