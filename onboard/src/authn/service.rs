//! Account session management

use std::sync::Arc;

use secrecy::SecretString;
use tracing::info;

use crate::authn::tokens::{AuthTokens, TokenStore};
use crate::errors::OnboardError;
use crate::http::auth::AuthApi;
use crate::http::transport::AuthenticatedTransport;

/// Login/logout front door; the only writer of tokens besides the transport
pub struct AuthService {
    api: Arc<AuthApi>,
    tokens: Arc<TokenStore>,
    transport: Arc<AuthenticatedTransport>,
}

impl AuthService {
    pub fn new(
        api: Arc<AuthApi>,
        tokens: Arc<TokenStore>,
        transport: Arc<AuthenticatedTransport>,
    ) -> Self {
        Self {
            api,
            tokens,
            transport,
        }
    }

    /// True when an access token is held
    pub fn is_authenticated(&self) -> bool {
        self.tokens.access_token().is_some()
    }

    pub async fn login(&self, email: &str, password: &SecretString) -> Result<(), OnboardError> {
        let tokens = self.api.login(email, password).await?;
        self.store(tokens).await?;
        info!("Logged in as {}", email);
        Ok(())
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &SecretString,
    ) -> Result<(), OnboardError> {
        let tokens = self.api.register(name, email, password).await?;
        self.store(tokens).await
    }

    pub async fn sign_in_federated(&self, id_token: &SecretString) -> Result<(), OnboardError> {
        let tokens = self.api.exchange_federated_token(id_token).await?;
        self.store(tokens).await
    }

    pub async fn complete_oauth(&self, code: &str, state: Option<&str>) -> Result<(), OnboardError> {
        let tokens = self.api.exchange_oauth_code(code, state).await?;
        self.store(tokens).await
    }

    /// User-triggered refresh, serialized with 401-driven refreshes
    pub async fn refresh_now(&self) -> Result<(), OnboardError> {
        self.transport.refresh_now().await.map(|_| ())
    }

    pub async fn logout(&self) {
        self.tokens.clear().await;
        info!("Logged out");
    }

    async fn store(&self, tokens: AuthTokens) -> Result<(), OnboardError> {
        self.tokens.replace(tokens).await
    }
}
