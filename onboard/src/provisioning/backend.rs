//! Backend-driven provisioning
//!
//! Instead of running a handshake locally, the chosen strategy id is handed to
//! the backend pipeline which reports back one result per stage.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use openapi_client::{
    ProvisioningRequest, ProvisioningResponse, ProvisioningStage, ProvisioningStatus, ProvisioningStep,
};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::discovery::models::{DiscoveredDevice, DiscoveryMetadata, PairingCapability};
use crate::errors::OnboardError;
use crate::http::client::ApiRequest;
use crate::http::transport::ApiTransport;
use crate::provisioning::models::{
    ProvisioningFailureReason, ProvisioningProgress, ProvisioningResult, WifiCredentials,
};
use crate::provisioning::strategy::ProgressFn;

/// Delegates provisioning to the backend over the authenticated transport
pub struct BackendProvisioner {
    transport: Arc<dyn ApiTransport>,
    cancel: Mutex<CancellationToken>,
}

impl BackendProvisioner {
    pub fn new(transport: Arc<dyn ApiTransport>) -> Self {
        Self {
            transport,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    pub async fn provision(
        &self,
        device: &DiscoveredDevice,
        metadata: &DiscoveryMetadata,
        credentials: &WifiCredentials,
        strategy_id: &str,
        on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult {
        let cancel = self.begin_attempt();
        let body = build_request(device, metadata, credentials, strategy_id);
        info!(
            "Requesting backend provisioning for {} (strategy={:?}, type={})",
            device.id, body.strategy, body.device_type
        );

        let request = match ApiRequest::post(format!("/api/v1/provisioning/devices/{}", device.id), &body) {
            Ok(request) => request,
            Err(e) => return ProvisioningResult::failure(ProvisioningFailureReason::Unknown, e.to_string()),
        };

        on_progress(ProvisioningProgress::ConnectingToDeviceAp);

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("Backend provisioning for {} cancelled", device.id);
                return ProvisioningResult::cancelled();
            }
            response = self.call(request) => response,
        };

        match response {
            Ok(response) => {
                for step in &response.steps {
                    if let Some(progress) = step.stage.and_then(progress_for_stage) {
                        on_progress(progress);
                    }
                }
                to_result(&response)
            }
            Err(e) => {
                error!("Backend provisioning for {} failed: {}", device.id, e);
                ProvisioningResult::failure(ProvisioningFailureReason::Unknown, e.to_string())
            }
        }
    }

    pub fn cancel(&self) {
        let current = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
    }

    fn begin_attempt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    async fn call(&self, request: ApiRequest) -> Result<ProvisioningResponse, OnboardError> {
        let response = self.transport.execute(request).await?;
        if !response.is_success() {
            return Err(response.into_error());
        }
        response.json()
    }
}

/// The backend knows SoftAP as plain `wifi`
pub fn normalize_strategy(strategy_id: &str) -> String {
    match strategy_id {
        "soft_ap" => "wifi".to_string(),
        other => other.to_string(),
    }
}

/// `wifi` for SoftAP-capable devices, otherwise the first advertised capability
pub fn choose_device_type(device: &DiscoveredDevice, metadata: &DiscoveryMetadata) -> String {
    if metadata.supports_soft_ap {
        return "wifi".to_string();
    }
    let device_type = match device.capabilities.iter().next() {
        Some(PairingCapability::ShortRangeRadio) => "bluetooth",
        Some(PairingCapability::OnboardingCode) => "onboarding_code",
        Some(PairingCapability::SoftAp) => "wifi",
        None => "generic",
    };
    device_type.to_string()
}

fn build_payload(credentials: &WifiCredentials, metadata: &DiscoveryMetadata) -> BTreeMap<String, Value> {
    let mut payload = BTreeMap::new();
    payload.insert("ssid".to_string(), Value::from(credentials.ssid.clone()));
    payload.insert(
        "password".to_string(),
        Value::from(credentials.password.expose_secret().to_string()),
    );

    if let Some(ssid) = &metadata.device_ssid {
        payload.insert("device_ssid".to_string(), Value::from(ssid.clone()));
    }
    if let Some(expected) = &metadata.expected_wifi_password {
        payload.insert(
            "expected_wifi_password".to_string(),
            Value::from(expected.expose_secret().to_string()),
        );
    }
    let flags = [
        ("supports_soft_ap", metadata.supports_soft_ap),
        ("supports_short_range_radio", metadata.supports_short_range_radio),
        ("supports_onboarding_code", metadata.supports_onboarding_code),
        ("device_ap_reachable", metadata.device_ap_reachable),
        ("responds_to_heartbeat", metadata.responds_to_heartbeat),
        ("simulated", metadata.simulated),
    ];
    for (key, value) in flags {
        payload.insert(key.to_string(), Value::from(value));
    }
    payload
}

pub fn build_request(
    device: &DiscoveredDevice,
    metadata: &DiscoveryMetadata,
    credentials: &WifiCredentials,
    strategy_id: &str,
) -> ProvisioningRequest {
    ProvisioningRequest {
        device_id: device.id.clone(),
        strategy: Some(normalize_strategy(strategy_id)),
        adapter: None,
        device_type: choose_device_type(device, metadata),
        capabilities: device
            .capabilities
            .iter()
            .map(|c| c.wire_name().to_string())
            .collect(),
        payload: build_payload(credentials, metadata),
    }
}

pub fn progress_for_stage(stage: ProvisioningStage) -> Option<ProvisioningProgress> {
    match stage {
        ProvisioningStage::Detect => Some(ProvisioningProgress::ConnectingToDeviceAp),
        ProvisioningStage::Precheck | ProvisioningStage::Provision => {
            Some(ProvisioningProgress::SendingCredentials)
        }
        ProvisioningStage::Confirm => Some(ProvisioningProgress::WaitingForDevice),
        ProvisioningStage::Rollback => None,
    }
}

pub fn failure_reason_for(step: Option<&ProvisioningStep>) -> ProvisioningFailureReason {
    match step.and_then(|s| s.stage) {
        Some(ProvisioningStage::Precheck) => ProvisioningFailureReason::BadPassword,
        Some(ProvisioningStage::Rollback) => ProvisioningFailureReason::Cancelled,
        Some(ProvisioningStage::Confirm) => ProvisioningFailureReason::DeviceTimeout,
        Some(ProvisioningStage::Provision) | Some(ProvisioningStage::Detect) | None => {
            ProvisioningFailureReason::Unknown
        }
    }
}

pub fn to_result(response: &ProvisioningResponse) -> ProvisioningResult {
    let failed_step = response.failed_step();
    let last_detail = failed_step
        .and_then(|s| s.detail.clone())
        .or_else(|| response.steps.last().and_then(|s| s.detail.clone()));

    if response.status == ProvisioningStatus::Succeeded {
        let message = last_detail.unwrap_or_else(|| format!("Provisioned via {}", response.strategy));
        info!("Backend provisioned {} via {}", response.device_id, response.adapter);
        return ProvisioningResult::Success(format!("{} (adapter={})", message, response.adapter));
    }

    let reason = failure_reason_for(failed_step);
    warn!(
        "Backend provisioning of {} ended as {:?}: {}",
        response.device_id, response.status, reason
    );
    ProvisioningResult::failure(
        reason,
        last_detail.unwrap_or_else(|| "Provisioning failed".to_string()),
    )
}
