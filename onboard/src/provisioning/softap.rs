//! SoftAP provisioning
//!
//! The phone joins the access point the device opens in setup mode, hands
//! over the home network credentials and then waits for the device to report
//! in from the home network. Phases run strictly in order and each one has its
//! own time budget:
//!
//! ```text
//! ConnectingToDeviceAp -> SendingCredentials -> WaitingForDevice -> Success
//!          |                     |                     |
//!    ApUnreachable          BadPassword          DeviceTimeout
//! ```
//!
//! Cancellation is checked at every phase boundary and raced against every
//! phase wait, and always wins over a failure.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discovery::models::{DiscoveryMetadata, PairingCapability};
use crate::provisioning::models::{
    ProvisioningFailureReason, ProvisioningProgress, ProvisioningResult, WifiCredentials,
};
use crate::provisioning::strategy::{ProgressFn, ProvisioningStrategy};
use crate::storage::settings::SoftApTimeoutSettings;

/// Simulated round trip of the metadata-backed link
const DEFAULT_LINK_LATENCY: Duration = Duration::from_millis(300);

/// Per-phase time budgets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftApTimeouts {
    pub connect: Duration,
    pub credential_ack: Duration,
    pub heartbeat: Duration,
}

impl Default for SoftApTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            credential_ack: Duration::from_secs(20),
            heartbeat: Duration::from_secs(20),
        }
    }
}

impl From<&SoftApTimeoutSettings> for SoftApTimeouts {
    fn from(settings: &SoftApTimeoutSettings) -> Self {
        Self {
            connect: Duration::from_millis(settings.connect_timeout_ms),
            credential_ack: Duration::from_millis(settings.credential_ack_timeout_ms),
            heartbeat: Duration::from_millis(settings.heartbeat_timeout_ms),
        }
    }
}

/// Device-side operations of the SoftAP handshake
#[async_trait]
pub trait SoftApLink: Send + Sync {
    /// Join the device access point; false if it cannot be reached
    async fn connect_to_access_point(&self, metadata: &DiscoveryMetadata) -> bool;

    /// Deliver credentials; false if the device rejects them
    async fn send_credentials(&self, metadata: &DiscoveryMetadata, credentials: &WifiCredentials) -> bool;

    /// Wait for the device heartbeat from the home network
    async fn await_heartbeat(&self, metadata: &DiscoveryMetadata) -> bool;
}

/// Link that answers from discovery metadata after a fixed latency
pub struct MetadataSoftApLink {
    latency: Duration,
}

impl MetadataSoftApLink {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for MetadataSoftApLink {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_LATENCY)
    }
}

#[async_trait]
impl SoftApLink for MetadataSoftApLink {
    async fn connect_to_access_point(&self, metadata: &DiscoveryMetadata) -> bool {
        tokio::time::sleep(self.latency).await;
        metadata.device_ap_reachable
    }

    async fn send_credentials(&self, metadata: &DiscoveryMetadata, credentials: &WifiCredentials) -> bool {
        tokio::time::sleep(self.latency).await;
        match &metadata.expected_wifi_password {
            Some(expected) => expected.expose_secret() == credentials.password.expose_secret(),
            None => true,
        }
    }

    async fn await_heartbeat(&self, metadata: &DiscoveryMetadata) -> bool {
        tokio::time::sleep(self.latency).await;
        metadata.responds_to_heartbeat
    }
}

enum PhaseOutcome {
    Completed(bool),
    TimedOut,
    Cancelled,
}

/// SoftAP strategy driving a [`SoftApLink`] through the three phases
pub struct SoftApProvisioningStrategy {
    link: Arc<dyn SoftApLink>,
    timeouts: SoftApTimeouts,
    cancel: Mutex<CancellationToken>,
}

impl SoftApProvisioningStrategy {
    pub fn new(link: Arc<dyn SoftApLink>, timeouts: SoftApTimeouts) -> Self {
        Self {
            link,
            timeouts,
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    /// Strategy backed by [`MetadataSoftApLink`]
    pub fn with_timeouts(timeouts: SoftApTimeouts) -> Self {
        Self::new(Arc::new(MetadataSoftApLink::default()), timeouts)
    }

    /// Install a fresh token so a cancel from a previous attempt cannot leak
    fn begin_attempt(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let mut current = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        *current = token.clone();
        token
    }

    async fn run_phase<F>(cancel: &CancellationToken, limit: Duration, work: F) -> PhaseOutcome
    where
        F: Future<Output = bool> + Send,
    {
        if cancel.is_cancelled() {
            return PhaseOutcome::Cancelled;
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => PhaseOutcome::Cancelled,
            outcome = tokio::time::timeout(limit, work) => match outcome {
                Ok(ok) => PhaseOutcome::Completed(ok),
                Err(_) => PhaseOutcome::TimedOut,
            },
        }
    }

    /// Map one phase outcome; `None` means move on to the next phase
    fn check_phase(
        outcome: PhaseOutcome,
        phase: ProvisioningProgress,
        reason: ProvisioningFailureReason,
        message: &str,
    ) -> Option<ProvisioningResult> {
        match outcome {
            PhaseOutcome::Completed(true) => {
                debug!("SoftAP phase '{}' done", phase);
                None
            }
            PhaseOutcome::Completed(false) => {
                warn!("SoftAP phase '{}' failed: {}", phase, reason);
                Some(ProvisioningResult::failure(reason, message))
            }
            PhaseOutcome::TimedOut => {
                warn!("SoftAP phase '{}' timed out", phase);
                Some(ProvisioningResult::failure(
                    ProvisioningFailureReason::DeviceTimeout,
                    "Device did not respond in time",
                ))
            }
            PhaseOutcome::Cancelled => {
                info!("SoftAP provisioning cancelled during '{}'", phase);
                Some(ProvisioningResult::cancelled())
            }
        }
    }
}

impl Default for SoftApProvisioningStrategy {
    fn default() -> Self {
        Self::with_timeouts(SoftApTimeouts::default())
    }
}

#[async_trait]
impl ProvisioningStrategy for SoftApProvisioningStrategy {
    fn id(&self) -> &str {
        "soft_ap"
    }

    fn name(&self) -> &str {
        "SoftAP"
    }

    fn required_user_action(&self) -> &str {
        "Connect to the device's Wi-Fi network to continue"
    }

    fn capability(&self) -> Option<PairingCapability> {
        Some(PairingCapability::SoftAp)
    }

    fn supports(&self, metadata: &DiscoveryMetadata) -> bool {
        metadata.supports_soft_ap
    }

    async fn provision(
        &self,
        metadata: &DiscoveryMetadata,
        credentials: &WifiCredentials,
        on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult {
        let cancel = self.begin_attempt();
        info!(
            "Starting SoftAP provisioning (device ssid: {:?}, network: {})",
            metadata.device_ssid, credentials.ssid
        );

        if cancel.is_cancelled() {
            return ProvisioningResult::cancelled();
        }
        on_progress(ProvisioningProgress::ConnectingToDeviceAp);
        let outcome = Self::run_phase(
            &cancel,
            self.timeouts.connect,
            self.link.connect_to_access_point(metadata),
        )
        .await;
        if let Some(result) = Self::check_phase(
            outcome,
            ProvisioningProgress::ConnectingToDeviceAp,
            ProvisioningFailureReason::ApUnreachable,
            "Unable to reach the device access point",
        ) {
            return result;
        }

        if cancel.is_cancelled() {
            return ProvisioningResult::cancelled();
        }
        on_progress(ProvisioningProgress::SendingCredentials);
        let outcome = Self::run_phase(
            &cancel,
            self.timeouts.credential_ack,
            self.link.send_credentials(metadata, credentials),
        )
        .await;
        if let Some(result) = Self::check_phase(
            outcome,
            ProvisioningProgress::SendingCredentials,
            ProvisioningFailureReason::BadPassword,
            "The Wi-Fi password was rejected by the device",
        ) {
            return result;
        }

        if cancel.is_cancelled() {
            return ProvisioningResult::cancelled();
        }
        on_progress(ProvisioningProgress::WaitingForDevice);
        let outcome = Self::run_phase(
            &cancel,
            self.timeouts.heartbeat,
            self.link.await_heartbeat(metadata),
        )
        .await;
        if let Some(result) = Self::check_phase(
            outcome,
            ProvisioningProgress::WaitingForDevice,
            ProvisioningFailureReason::DeviceTimeout,
            "Device did not confirm joining the network",
        ) {
            return result;
        }

        if cancel.is_cancelled() {
            return ProvisioningResult::cancelled();
        }

        let device = metadata.device_ssid.as_deref().unwrap_or("Device");
        info!("SoftAP provisioning complete for {}", device);
        ProvisioningResult::Success(format!("{} is joining {}", device, credentials.ssid))
    }

    fn cancel(&self) {
        let current = self.cancel.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::Mutex as StdMutex;

    fn metadata_with_password(password: &str) -> DiscoveryMetadata {
        DiscoveryMetadata {
            device_ssid: Some("Bulb-Setup".to_string()),
            supports_soft_ap: true,
            expected_wifi_password: Some(SecretString::from(password.to_string())),
            ..Default::default()
        }
    }

    fn recorder() -> (Arc<StdMutex<Vec<ProvisioningProgress>>>, impl Fn(ProvisioningProgress) + Send + Sync) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |p| sink.lock().unwrap().push(p))
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_password_succeeds() {
        let strategy = SoftApProvisioningStrategy::default();
        let (seen, on_progress) = recorder();
        let result = strategy
            .provision(&metadata_with_password("pw1"), &WifiCredentials::new("Home", "pw1"), &on_progress)
            .await;

        assert_eq!(result, ProvisioningResult::Success("Bulb-Setup is joining Home".to_string()));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ProvisioningProgress::ConnectingToDeviceAp,
                ProvisioningProgress::SendingCredentials,
                ProvisioningProgress::WaitingForDevice,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_password_is_accepted() {
        let strategy = SoftApProvisioningStrategy::default();
        let metadata = DiscoveryMetadata {
            supports_soft_ap: true,
            ..Default::default()
        };
        let result = strategy
            .provision(&metadata, &WifiCredentials::new("Home", "anything"), &|_| {})
            .await;
        assert_eq!(result, ProvisioningResult::Success("Device is joining Home".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cancel_does_not_leak_into_next_attempt() {
        let strategy = SoftApProvisioningStrategy::default();
        strategy.cancel();
        let result = strategy
            .provision(&metadata_with_password("pw1"), &WifiCredentials::new("Home", "pw1"), &|_| {})
            .await;
        assert!(result.is_success());
    }

    #[test]
    fn test_timeouts_from_settings() {
        let settings = SoftApTimeoutSettings {
            connect_timeout_ms: 1000,
            credential_ack_timeout_ms: 2000,
            heartbeat_timeout_ms: 3000,
        };
        let timeouts = SoftApTimeouts::from(&settings);
        assert_eq!(timeouts.connect, Duration::from_secs(1));
        assert_eq!(timeouts.heartbeat, Duration::from_secs(3));
    }
}
