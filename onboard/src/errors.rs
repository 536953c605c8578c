//! Error types for the onboarding agent

use thiserror::Error;

/// Main error type for the onboarding agent
#[derive(Error, Debug)]
pub enum OnboardError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Token error: {0}")]
    TokenError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Discovery error: {0}")]
    DiscoveryError(String),

    #[error("Provisioning error: {0}")]
    ProvisioningError(String),

    #[error("Registration error: {0}")]
    RegistrationError(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl OnboardError {
    /// True for connection-level failures (refused, reset, timed out) that
    /// never produced an HTTP response.
    pub fn is_transport(&self) -> bool {
        match self {
            OnboardError::IoError(_) => true,
            OnboardError::HttpError(e) => {
                e.is_connect() || e.is_timeout() || e.is_request() || e.is_body()
            }
            _ => false,
        }
    }

    /// HTTP status code carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            OnboardError::HttpStatus { status, .. } => Some(*status),
            OnboardError::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for OnboardError {
    fn from(err: anyhow::Error) -> Self {
        OnboardError::Internal(err.to_string())
    }
}
