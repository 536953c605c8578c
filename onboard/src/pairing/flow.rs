//! Pair-then-register flow

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::pairing::orchestrator::{PairingOutcome, PairingSession};
use crate::provisioning::models::{ProvisioningFailureReason, WifiCredentials};
use crate::provisioning::strategy::ProgressFn;
use crate::registration::cache::DeviceMetadata;
use crate::registration::client::{DeviceRegistrationClient, DeviceRegistrationRequest, RegistrationResult};

/// Where a freshly paired device is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationTarget {
    pub location_id: String,
    pub zone_id: String,
    /// Display name override; defaults to the discovered name
    pub name: Option<String>,
}

#[derive(Debug)]
pub enum OnboardingOutcome {
    Registered(DeviceMetadata),
    PairingFailed {
        reason: ProvisioningFailureReason,
        message: String,
    },
    RegistrationFailed(RegistrationResult),
    /// Abandoned through the cancel token; pending registration retries are dropped
    Cancelled,
}

/// Provisions a device and registers it once it has joined the network
pub struct OnboardingFlow {
    registration: Arc<DeviceRegistrationClient>,
    max_retries: u32,
    initial_delay: Duration,
}

impl OnboardingFlow {
    pub fn new(registration: Arc<DeviceRegistrationClient>, max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            registration,
            max_retries,
            initial_delay,
        }
    }

    pub async fn pair_and_register(
        &self,
        session: &PairingSession,
        credentials: &WifiCredentials,
        target: &RegistrationTarget,
        on_progress: ProgressFn<'_>,
    ) -> OnboardingOutcome {
        self.pair_and_register_until(session, credentials, target, on_progress, &CancellationToken::new())
            .await
    }

    /// Same as `pair_and_register`, abandoned once `cancel` fires.
    ///
    /// During provisioning the cancel is forwarded to the session. During
    /// registration the pending call and its retries are dropped.
    pub async fn pair_and_register_until(
        &self,
        session: &PairingSession,
        credentials: &WifiCredentials,
        target: &RegistrationTarget,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> OnboardingOutcome {
        let provision = session.provision(credentials, on_progress);
        tokio::pin!(provision);
        let outcome = tokio::select! {
            outcome = &mut provision => outcome,
            _ = cancel.cancelled() => {
                session.cancel();
                provision.await
            }
        };

        let paired = match outcome {
            PairingOutcome::Paired(device) => device,
            PairingOutcome::Failed { reason, message } => {
                warn!("Pairing of {} failed ({}): {}", session.device().id, reason, message);
                return OnboardingOutcome::PairingFailed { reason, message };
            }
        };
        if cancel.is_cancelled() {
            warn!("Device {} paired but onboarding was cancelled before registration", paired.id);
            return OnboardingOutcome::Cancelled;
        }

        let request = DeviceRegistrationRequest {
            device_id: paired.id,
            name: target.name.clone().unwrap_or(paired.name),
            location_id: target.location_id.clone(),
            zone_id: target.zone_id.clone(),
        };
        info!(
            "Device {} paired, registering in {}/{}",
            request.device_id, request.location_id, request.zone_id
        );

        let registration = self
            .registration
            .register_device(&request, self.max_retries, self.initial_delay);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Registration of {} cancelled", request.device_id);
                OnboardingOutcome::Cancelled
            }
            result = registration => match result {
                RegistrationResult::Success(metadata) => OnboardingOutcome::Registered(metadata),
                other => OnboardingOutcome::RegistrationFailed(other),
            },
        }
    }
}
