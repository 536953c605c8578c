//! Provisioning strategy contract

use async_trait::async_trait;

use crate::discovery::models::{DiscoveryMetadata, PairingCapability};
use crate::provisioning::models::{
    ProvisioningProgress, ProvisioningResult, ProvisioningStrategySummary, WifiCredentials,
};

/// Progress callback handed to a running strategy
pub type ProgressFn<'a> = &'a (dyn Fn(ProvisioningProgress) + Send + Sync);

/// One way of delivering network credentials to a device.
///
/// `provision` never returns an error: every outcome, including
/// cancellation, is a [`ProvisioningResult`]. Once it returns no further
/// progress is reported for that attempt.
#[async_trait]
pub trait ProvisioningStrategy: Send + Sync {
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    /// What the user has to do on the device before provisioning starts
    fn required_user_action(&self) -> &str;

    /// Capability this strategy serves, if it is tied to one
    fn capability(&self) -> Option<PairingCapability>;

    fn supports(&self, metadata: &DiscoveryMetadata) -> bool;

    async fn provision(
        &self,
        metadata: &DiscoveryMetadata,
        credentials: &WifiCredentials,
        on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult;

    /// Request cancellation of the running attempt; a no-op when idle
    fn cancel(&self);

    fn summary(&self) -> ProvisioningStrategySummary {
        ProvisioningStrategySummary {
            id: self.id().to_string(),
            name: self.name().to_string(),
            required_user_action: self.required_user_action().to_string(),
        }
    }
}
