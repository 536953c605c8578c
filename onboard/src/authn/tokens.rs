//! Access/refresh token pair and its store

use std::sync::{Arc, RwLock};

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, warn};

use crate::errors::OnboardError;
use crate::storage::secrets::SecretStore;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Token pair issued by the auth endpoints.
///
/// The access token lifetime is enforced by the backend only.
#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
}

impl AuthTokens {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: refresh_token.map(SecretString::from),
        }
    }
}

impl From<openapi_client::AuthTokensResponse> for AuthTokens {
    fn from(resp: openapi_client::AuthTokensResponse) -> Self {
        AuthTokens::new(resp.access_token, resp.refresh_token)
    }
}

/// Thread-safe holder of the current token pair
#[derive(Default)]
pub struct TokenStore {
    tokens: RwLock<Option<AuthTokens>>,
    secrets: Option<Arc<dyn SecretStore>>,
}

impl TokenStore {
    /// Create an empty, memory-only token store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token store that mirrors every change into `secrets`
    pub fn with_secret_store(secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            tokens: RwLock::new(None),
            secrets: Some(secrets),
        }
    }

    /// Load a previously persisted pair, if any
    pub async fn restore(&self) -> Result<bool, OnboardError> {
        let Some(secrets) = &self.secrets else {
            return Ok(false);
        };

        let Some(access_token) = secrets.get(ACCESS_TOKEN_KEY).await? else {
            debug!("No persisted tokens found");
            return Ok(false);
        };
        let refresh_token = secrets.get(REFRESH_TOKEN_KEY).await?;

        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        *tokens = Some(AuthTokens {
            access_token,
            refresh_token,
        });
        Ok(true)
    }

    /// Get the current token pair
    pub fn current(&self) -> Option<AuthTokens> {
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        tokens.clone()
    }

    /// Get the current access token
    pub fn access_token(&self) -> Option<SecretString> {
        self.current().map(|t| t.access_token)
    }

    /// Get the current refresh token
    pub fn refresh_token(&self) -> Option<SecretString> {
        self.current().and_then(|t| t.refresh_token)
    }

    /// True when the store currently holds `token` as its access token
    pub fn is_current_access_token(&self, token: Option<&str>) -> bool {
        let current = self.access_token();
        match (current.as_ref(), token) {
            (Some(current), Some(token)) => current.expose_secret() == token,
            (None, None) => true,
            _ => false,
        }
    }

    /// Replace the token pair
    pub async fn replace(&self, new_tokens: AuthTokens) -> Result<(), OnboardError> {
        {
            let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
            *tokens = Some(new_tokens.clone());
        }

        if let Some(secrets) = &self.secrets {
            secrets
                .put(ACCESS_TOKEN_KEY, new_tokens.access_token.clone())
                .await?;
            match new_tokens.refresh_token {
                Some(refresh) => secrets.put(REFRESH_TOKEN_KEY, refresh).await?,
                None => secrets.remove(REFRESH_TOKEN_KEY).await?,
            }
        }
        Ok(())
    }

    /// Drop the token pair, forcing re-authentication
    pub async fn clear(&self) {
        {
            let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
            *tokens = None;
        }

        if let Some(secrets) = &self.secrets {
            for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                if let Err(e) = secrets.remove(key).await {
                    warn!("Failed to remove persisted {}: {}", key, e);
                }
            }
        }
    }
}
