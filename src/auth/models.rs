//! Request and response bodies of the `/auth` and `/users` endpoints

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Minimum password length accepted client-side
pub const MIN_PASSWORD_LEN: usize = 8;

/// Login credentials (sent as an OAuth2 password form)
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Email or username
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if self.username.trim().is_empty() {
            return Err(ClientError::Validation("username is required".into()));
        }
        if self.password.is_empty() {
            return Err(ClientError::Validation("password is required".into()));
        }
        Ok(())
    }
}

/// Body of `POST /auth/register`
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl RegisterRequest {
    pub fn validate(&self) -> ClientResult<()> {
        if self.username.trim().is_empty() {
            return Err(ClientError::Validation("username is required".into()));
        }
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

pub fn validate_email(email: &str) -> ClientResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ClientError::Validation(format!(
            "'{}' is not a valid email address",
            email
        ))),
    }
}

pub fn validate_password(password: &str) -> ClientResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ClientError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// User as returned by `/auth/register`, `/auth/login` and `/users/me`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: Option<i64>,
    pub username: String,
    pub email: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub strategy_config: serde_json::Value,
}

fn default_true() -> bool {
    true
}

/// Body of a successful `POST /auth/login`
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Body of a successful `POST /auth/refresh-token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// `{"message": ...}` acknowledgement
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}
