//! Short-range radio provisioning

use async_trait::async_trait;
use tracing::warn;

use crate::discovery::models::{DiscoveryMetadata, PairingCapability};
use crate::provisioning::models::{ProvisioningFailureReason, ProvisioningResult, WifiCredentials};
use crate::provisioning::strategy::{ProgressFn, ProvisioningStrategy};

/// Fallback for devices that only pair over the radio link.
///
/// Selected like any other strategy but the radio handshake is not
/// available yet, so every attempt reports `Unsupported`.
#[derive(Debug, Default)]
pub struct BluetoothProvisioningStrategy;

#[async_trait]
impl ProvisioningStrategy for BluetoothProvisioningStrategy {
    fn id(&self) -> &str {
        "bluetooth_fallback"
    }

    fn name(&self) -> &str {
        "Bluetooth Fallback"
    }

    fn required_user_action(&self) -> &str {
        "Keep the device nearby and enable Bluetooth"
    }

    fn capability(&self) -> Option<PairingCapability> {
        Some(PairingCapability::ShortRangeRadio)
    }

    fn supports(&self, metadata: &DiscoveryMetadata) -> bool {
        metadata.supports_short_range_radio
    }

    async fn provision(
        &self,
        _metadata: &DiscoveryMetadata,
        _credentials: &WifiCredentials,
        _on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult {
        warn!("Bluetooth provisioning requested but not available");
        ProvisioningResult::failure(
            ProvisioningFailureReason::Unsupported,
            "Bluetooth provisioning is not yet implemented",
        )
    }

    fn cancel(&self) {}
}
