//! QR / onboarding code provisioning

use async_trait::async_trait;
use tracing::warn;

use crate::discovery::models::{DiscoveryMetadata, PairingCapability};
use crate::provisioning::models::{ProvisioningFailureReason, ProvisioningResult, WifiCredentials};
use crate::provisioning::strategy::{ProgressFn, ProvisioningStrategy};

/// Pairs a device from a scanned onboarding code; reports `Unsupported` for now
#[derive(Debug, Default)]
pub struct OnboardingCodeProvisioningStrategy;

#[async_trait]
impl ProvisioningStrategy for OnboardingCodeProvisioningStrategy {
    fn id(&self) -> &str {
        "onboarding_code"
    }

    fn name(&self) -> &str {
        "QR / Onboarding Code"
    }

    fn required_user_action(&self) -> &str {
        "Scan the onboarding code to continue"
    }

    fn capability(&self) -> Option<PairingCapability> {
        Some(PairingCapability::OnboardingCode)
    }

    fn supports(&self, metadata: &DiscoveryMetadata) -> bool {
        metadata.supports_onboarding_code
    }

    async fn provision(
        &self,
        _metadata: &DiscoveryMetadata,
        _credentials: &WifiCredentials,
        _on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult {
        warn!("Onboarding code provisioning requested but not available");
        ProvisioningResult::failure(
            ProvisioningFailureReason::Unsupported,
            "QR/onboarding code provisioning is not yet implemented",
        )
    }

    fn cancel(&self) {}
}
