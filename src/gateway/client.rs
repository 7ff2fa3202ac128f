//! API gateway client
//!
//! Wraps every outbound REST call with:
//! - the current bearer token, when there is one
//! - a fresh `X-Request-ID`
//! - bounded retry with backoff for idempotent methods on transient failures
//! - one refresh-and-retry when a token-bearing request is rejected with 401

use std::sync::Arc;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::constants::REQUEST_ID_HEADER;
use crate::config::ApiConfig;
use crate::core::http::{build_http_client, decode_json, read_body};
use crate::core::retry::{retry_with_backoff, RetryConfig};
use crate::error::{ClientError, ClientResult};

/// One logical request, replayable across retries
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below `/api/v1`, starting with `/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::Validation(format!("unserializable request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// GET, HEAD, PUT and DELETE may be replayed; POST never is
    pub fn is_idempotent(&self) -> bool {
        matches!(
            self.method,
            Method::GET | Method::HEAD | Method::PUT | Method::DELETE
        )
    }

    fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Authenticated REST client
pub struct ApiGateway {
    api_root: String,
    http_client: reqwest::Client,
    timeout_ms: u64,
    retry: RetryConfig,
    auth: Arc<dyn Authenticator>,
}

impl ApiGateway {
    pub fn new(api: &ApiConfig, retry: RetryConfig, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            api_root: api.api_root(),
            http_client: build_http_client(api.request_timeout()),
            timeout_ms: api.request_timeout_ms,
            retry,
            auth,
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Send `request` and return the raw response body.
    ///
    /// A 401 on a request that carried a token triggers exactly one
    /// refresh and one replay. A second 401 logs the user out and is
    /// returned to the caller.
    pub async fn send(&self, request: &ApiRequest) -> ClientResult<String> {
        let token = self.auth.access_token().await;

        let first = self.send_with_retry(request, token.as_deref()).await;
        let stale = match (first, token) {
            (Err(e), Some(stale)) if e.is_unauthorized() => {
                warn!(request = %request.label(), "Request rejected with 401, refreshing token");
                stale
            }
            (result, _) => return result,
        };

        // A failed refresh has already cleared the session
        let fresh = self.auth.refresh_token(&stale).await?;

        match self.send_with_retry(request, Some(&fresh)).await {
            Err(e) if e.is_unauthorized() => {
                warn!(request = %request.label(), "Refreshed token rejected, logging out");
                self.auth.logout().await;
                Err(e)
            }
            other => other,
        }
    }

    /// Send and decode the JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> ClientResult<T> {
        let text = self.send(request).await?;
        decode_json(&text)
    }

    async fn send_with_retry(&self, request: &ApiRequest, token: Option<&str>) -> ClientResult<String> {
        if !request.is_idempotent() {
            return self.send_once(request, token).await;
        }

        retry_with_backoff(
            &self.retry,
            &request.label(),
            ClientError::is_transient,
            || self.send_once(request, token),
        )
        .await
    }

    async fn send_once(&self, request: &ApiRequest, token: Option<&str>) -> ClientResult<String> {
        let url = format!("{}{}", self.api_root, request.path);
        let request_id = Uuid::new_v4().to_string();

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(REQUEST_ID_HEADER, &request_id);
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!(
            method = %request.method,
            path = %request.path,
            request_id = %request_id,
            authenticated = token.is_some(),
            "Sending request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| ClientError::from_transport(e, self.timeout_ms))?;
        read_body(response, self.timeout_ms).await
    }
}
