//! Token refresh seam

use async_trait::async_trait;
use secrecy::SecretString;

use crate::authn::tokens::AuthTokens;
use crate::errors::OnboardError;

/// Exchanges a refresh token for a new pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<AuthTokens, OnboardError>;
}
