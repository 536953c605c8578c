//! Auth API client

use std::sync::Arc;

use async_trait::async_trait;
use openapi_client::{
    AuthTokensResponse, FederatedAuthRequest, LoginRequest, OAuthCallbackRequest,
    RefreshRequest, RegisterRequest,
};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::authn::refresher::TokenRefresher;
use crate::authn::tokens::AuthTokens;
use crate::errors::OnboardError;
use crate::http::client::HttpClient;

/// Login, registration, federated exchange and refresh endpoints.
///
/// These calls are sent without a bearer credential and never pass through the
/// refreshing transport.
pub struct AuthApi {
    http_client: Arc<HttpClient>,
}

impl AuthApi {
    pub fn new(http_client: Arc<HttpClient>) -> Self {
        Self { http_client }
    }

    /// Email/password login
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<AuthTokens, OnboardError> {
        debug!("Logging in as {}", email);
        let body = LoginRequest {
            email: email.to_string(),
            password: password.expose_secret().to_string(),
        };
        self.exchange("/api/auth/login", &body).await
    }

    /// Create an account and sign in
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<AuthTokens, OnboardError> {
        let body = RegisterRequest {
            name: name.to_string(),
            email: email.to_string(),
            password: password.expose_secret().to_string(),
        };
        self.exchange("/api/auth/register", &body).await
    }

    /// Trade a federated identity token for a token pair
    pub async fn exchange_federated_token(&self, id_token: &SecretString) -> Result<AuthTokens, OnboardError> {
        let body = FederatedAuthRequest {
            id_token: id_token.expose_secret().to_string(),
        };
        self.exchange("/api/auth/google", &body).await
    }

    /// Trade an OAuth authorization code for a token pair
    pub async fn exchange_oauth_code(
        &self,
        code: &str,
        state: Option<&str>,
    ) -> Result<AuthTokens, OnboardError> {
        let body = OAuthCallbackRequest {
            code: code.to_string(),
            state: state.map(str::to_string),
        };
        self.exchange("/api/auth/oauth/callback", &body).await
    }

    async fn exchange<B: serde::Serialize>(&self, path: &str, body: &B) -> Result<AuthTokens, OnboardError> {
        let response: AuthTokensResponse = self
            .http_client
            .post_json(path, body)
            .await
            .map_err(|e| match e.status() {
                Some(401) | Some(403) => OnboardError::AuthError(e.to_string()),
                _ => e,
            })?;
        Ok(response.into())
    }
}

#[async_trait]
impl TokenRefresher for AuthApi {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthTokens, OnboardError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.expose_secret().to_string(),
        };
        self.exchange("/api/auth/refresh", &body)
            .await
            .map_err(|e| OnboardError::TokenError(format!("Token refresh failed: {}", e)))
    }
}
