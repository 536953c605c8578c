//! Authenticated transport with single-flight token refresh
//!
//! Every outbound call carries the current access token. A 401 triggers at
//! most one refresh across all concurrent callers: the refresh runs while
//! holding `refresh_lock`, and callers that queued behind it compare the token
//! they sent with the one now stored. If it changed, someone else already
//! refreshed and they simply retry with the stored token. The original request
//! is retried exactly once; a second 401 is returned to the caller as-is.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::authn::refresher::TokenRefresher;
use crate::authn::tokens::{AuthTokens, TokenStore};
use crate::errors::OnboardError;
use crate::http::client::{ApiRequest, ApiResponse, HttpSend};

/// Executes backend calls on behalf of the onboarding components.
///
/// `Err` is reserved for transport failures; every HTTP status, including a
/// final 401, comes back as `Ok`.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, OnboardError>;
}

/// Transport that attaches bearer tokens and recovers from expired ones
pub struct AuthenticatedTransport {
    sender: Arc<dyn HttpSend>,
    tokens: Arc<TokenStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_lock: Mutex<()>,
    refresh_calls: AtomicU64,
}

impl AuthenticatedTransport {
    pub fn new(
        sender: Arc<dyn HttpSend>,
        tokens: Arc<TokenStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            sender,
            tokens,
            refresher,
            refresh_lock: Mutex::new(()),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Token store backing this transport
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Number of refresh calls issued so far
    pub fn refresh_count(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Refresh immediately, e.g. on an explicit user request.
    ///
    /// Shares the single-flight guard with the 401 path.
    pub async fn refresh_now(&self) -> Result<AuthTokens, OnboardError> {
        let _guard = self.refresh_lock.lock().await;
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| OnboardError::AuthError("No refresh token available".to_string()))?;
        self.refresh_locked(&refresh_token).await
    }

    /// Called with `refresh_lock` held
    async fn refresh_locked(&self, refresh_token: &SecretString) -> Result<AuthTokens, OnboardError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        info!("Refreshing access token...");

        match self.refresher.refresh(refresh_token).await {
            Ok(new_tokens) => {
                // the new pair is held in memory even when persisting it fails
                if let Err(e) = self.tokens.replace(new_tokens.clone()).await {
                    warn!("Failed to persist refreshed tokens: {}", e);
                }
                info!("Access token refreshed");
                Ok(new_tokens)
            }
            Err(e) => {
                warn!("Token refresh failed, clearing stored tokens: {}", e);
                self.tokens.clear().await;
                Err(e)
            }
        }
    }

    /// Obtain a token worth retrying with after `sent_token` was rejected.
    ///
    /// Returns `None` when the request must fail.
    async fn recover_from_unauthorized(&self, sent_token: Option<&str>) -> Option<SecretString> {
        if self.tokens.refresh_token().is_none() {
            debug!("No refresh token, not retrying");
            return None;
        }

        let _guard = self.refresh_lock.lock().await;

        if !self.tokens.is_current_access_token(sent_token) {
            // refreshed (or cleared) by a concurrent caller while we waited
            debug!("Token changed while waiting, retrying with the current one");
            return self.tokens.access_token();
        }

        let refresh_token = self.tokens.refresh_token()?;
        self.refresh_locked(&refresh_token)
            .await
            .ok()
            .map(|t| t.access_token)
    }
}

#[async_trait]
impl ApiTransport for AuthenticatedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, OnboardError> {
        let sent_token = self.tokens.access_token();
        let sent = sent_token.as_ref().map(|t| t.expose_secret());

        let response = self.sender.send(&request, sent).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("{} {} returned 401", request.method, request.path);
        let Some(retry_token) = self.recover_from_unauthorized(sent).await else {
            return Ok(response);
        };

        let retried = self
            .sender
            .send(&request, Some(retry_token.expose_secret()))
            .await?;
        if retried.status == StatusCode::UNAUTHORIZED {
            // second 401 in the chain, give up instead of refreshing again
            warn!(
                "{} {} still unauthorized after refresh, giving up",
                request.method, request.path
            );
        }
        Ok(retried)
    }
}
