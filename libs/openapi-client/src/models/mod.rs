//! API models

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =================================== AUTH ======================================== //

/// Login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Account registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Federated identity exchange request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FederatedAuthRequest {
    pub id_token: String,
}

/// OAuth authorization code callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthCallbackRequest {
    pub code: String,
    pub state: Option<String>,
}

/// Token refresh request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Authenticated user summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Option<String>,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Token pair returned by every auth endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokensResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: Option<u64>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

// =============================== REGISTRATION ==================================== //

/// Device registration body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistrationBody {
    pub device_id: String,
    pub name: String,
}

/// Device registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRegistrationResponse {
    pub device_id: String,
    pub name: String,
    pub zone_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
}

/// Body of a 409 response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConflictResponse {
    pub message: Option<String>,
}

// =============================== PROVISIONING ==================================== //

/// Backend provisioning request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    pub device_id: String,
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    pub device_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub payload: BTreeMap<String, serde_json::Value>,
}

/// Overall or per-stage provisioning status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

/// Backend provisioning pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisioningStage {
    Detect,
    Precheck,
    Provision,
    Confirm,
    Rollback,
}

/// Result of one backend pipeline stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningStep {
    pub stage: Option<ProvisioningStage>,
    pub status: Option<ProvisioningStatus>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

/// Backend provisioning response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningResponse {
    pub device_id: String,
    pub strategy: String,
    pub adapter: String,
    pub status: ProvisioningStatus,
    #[serde(default)]
    pub steps: Vec<ProvisioningStep>,
}

impl ProvisioningResponse {
    /// First stage reported as failed
    pub fn failed_step(&self) -> Option<&ProvisioningStep> {
        self.steps
            .iter()
            .find(|s| s.status == Some(ProvisioningStatus::Failed))
    }
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
