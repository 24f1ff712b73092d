//! Authenticated requests routed through the session's current token.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::auth::SessionManager;
use crate::models::Identity;

use super::{ApiClient, ApiError};

const CURRENT_USER_PATH: &str = "/api/users/me";

/// Sends requests with `Authorization: Bearer <token>` taken from the
/// session at call time. A 401 response logs the session out.
#[derive(Clone)]
pub struct AuthorizedClient {
    api: ApiClient,
    session: Arc<SessionManager>,
}

impl AuthorizedClient {
    pub fn new(api: ApiClient, session: Arc<SessionManager>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let token = self.session.token();
        let request = self.api.request(Method::DELETE, path, token.as_deref());
        let result = self.api.send_empty(request).await;
        self.observe(token.as_deref(), result)
    }

    /// Profile of the logged-in user as the backend sees it.
    pub async fn current_user(&self) -> Result<Identity, ApiError> {
        self.get(CURRENT_USER_PATH).await
    }

    async fn send<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let token = self.session.token();
        debug!(%method, path, authenticated = token.is_some(), "Sending request");

        let mut request = self.api.request(method, path, token.as_deref());
        if let Some(body) = body {
            request = request.json(body);
        }
        let result = self.api.send_json(request).await;
        self.observe(token.as_deref(), result)
    }

    /// Turn an auth-rejection of the token we sent into a logout.
    fn observe<T>(&self, sent_token: Option<&str>, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(ref e) = result {
            if e.is_auth_rejection() {
                if let Some(token) = sent_token {
                    self.session.invalidate(token);
                }
            }
        }
        result
    }
}
