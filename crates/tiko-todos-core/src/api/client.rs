//! API client for the hosted todo service.
//!
//! `ApiClient` knows the endpoint paths and wire shapes. It holds no
//! credentials; tokens are passed per call by the session manager.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::{RegistrationProfile, TokenPair};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Base URL of the hosted service
pub const DEFAULT_BASE_URL: &str = "https://todos-api.public.tiko.energy/api/";

/// HTTP request timeout in seconds.
/// 30s allows for slow mobile links while failing fast enough for good UX.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    refresh: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: String,
}

/// API client for the todo service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the hosted service with the default timeout
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(DEFAULT_BASE_URL, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: normalize_base_url(base_url),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The shared HTTP client, for building requests outside this module
    pub fn http(&self) -> &Client {
        &self.client
    }

    /// Absolute URL for an endpoint path relative to the base
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Check if response is successful, returning an error with body if not.
    pub async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// `POST login/` - exchange credentials for a token pair
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let response = self
            .request(Method::POST, "login/")
            .json(&LoginRequest { email, password })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let tokens: TokenPair = response.json().await?;
        Ok(tokens)
    }

    /// `POST register/` - create an account
    pub async fn register(&self, profile: &RegistrationProfile) -> Result<(), ApiError> {
        let response = self
            .request(Method::POST, "register/")
            .json(profile)
            .send()
            .await?;

        Self::check_response(response).await?;
        Ok(())
    }

    /// `GET token/verify/` - `Ok(true)` on 2xx, `Ok(false)` on any other status.
    /// Transport failures are errors, not a verdict on the token.
    pub async fn verify_token(&self, access: &str) -> Result<bool, ApiError> {
        let response = self
            .request(Method::GET, "token/verify/")
            .bearer_auth(access)
            .send()
            .await?;

        let status = response.status();
        debug!(status = %status, "Token verification answered");
        Ok(status.is_success())
    }

    /// `POST token/refresh/` - mint a new access token
    pub async fn refresh_token(&self, refresh: &str) -> Result<String, ApiError> {
        let response = self
            .request(Method::POST, "token/refresh/")
            .json(&RefreshRequest { refresh })
            .send()
            .await?;

        let response = Self::check_response(response).await?;
        let body: RefreshResponse = response.json().await?;
        Ok(body.access)
    }
}

/// Ensure the base URL ends with exactly one `/` so paths can be appended.
pub fn normalize_base_url(base_url: &str) -> String {
    format!("{}/", base_url.trim().trim_end_matches('/'))
}
