//! HTTP client for the Manupedia REST backend.
//!
//! `ApiClient` owns the connection pool and knows how to build requests
//! against the configured base URL. It implements `AuthApi`, the seam the
//! session manager uses for login and signup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::models::{AuthResponse, LoginRequest, SignupRequest};

use super::ApiError;

/// Default backend location when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/api/auth/login";
const SIGNUP_PATH: &str = "/api/auth/signup";

/// Remote authentication endpoints consumed by the session manager.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest<'_>) -> Result<AuthResponse, ApiError>;

    async fn signup(&self, request: &SignupRequest<'_>) -> Result<AuthResponse, ApiError>;
}

pub type DynAuthApi = Arc<dyn AuthApi>;

/// API client for the Manupedia backend.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Create a new API client with the default request timeout
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join a path onto the base URL. Paths are expected to start with `/`.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Build a request, attaching the bearer token when one is given.
    pub(crate) fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: Response) -> Result<Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body))
        }
    }

    /// Send a request and decode the JSON body of a successful response.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = Self::check_response(request.send().await?).await?;
        let url = response.url().clone();
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            debug!(%url, error = %e, "Undecodable response body");
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
        })
    }

    /// Send a request whose successful body is irrelevant.
    pub(crate) async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        Self::check_response(request.send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, request: &LoginRequest<'_>) -> Result<AuthResponse, ApiError> {
        debug!(email = request.email, "Sending login request");
        let builder = self.request(Method::POST, LOGIN_PATH, None).json(request);
        self.send_json(builder).await
    }

    async fn signup(&self, request: &SignupRequest<'_>) -> Result<AuthResponse, ApiError> {
        debug!(email = request.email, "Sending signup request");
        let builder = self.request(Method::POST, SIGNUP_PATH, None).json(request);
        self.send_json(builder).await
    }
}
