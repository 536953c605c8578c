//! Canned discovery data for demos and tests

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::discovery::models::{DiscoveredDevice, DiscoveryFinding, DiscoveryMetadata, PairingCapability};
use crate::discovery::strategy::DiscoveryStrategy;
use crate::errors::OnboardError;

/// Returns a fixed set of findings after an optional delay.
///
/// Every finding is marked as simulated.
pub struct FixtureStrategy {
    id: String,
    findings: Vec<DiscoveryFinding>,
    delay: Duration,
    error: Option<String>,
}

impl FixtureStrategy {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            findings: Vec::new(),
            delay: Duration::ZERO,
            error: None,
        }
    }

    pub fn with_finding(mut self, device: DiscoveredDevice, metadata: DiscoveryMetadata) -> Self {
        self.findings.push(DiscoveryFinding::new(
            device,
            DiscoveryMetadata {
                simulated: true,
                ..metadata
            },
        ));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail with `message` instead of returning findings
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }
}

#[async_trait]
impl DiscoveryStrategy for FixtureStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    async fn discover(&self, cancel: CancellationToken) -> Result<Vec<DiscoveryFinding>, OnboardError> {
        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Fixture strategy {} cancelled", self.id);
                    return Err(OnboardError::Cancelled(format!("{} cancelled", self.id)));
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        if let Some(message) = &self.error {
            return Err(OnboardError::DiscoveryError(message.clone()));
        }

        Ok(self.findings.clone())
    }
}

/// Fixture set resembling one scan per common transport
pub fn standard_fixtures() -> Vec<Arc<dyn DiscoveryStrategy>> {
    let wifi = FixtureStrategy::new("wifi_soft_ap")
        .with_delay(Duration::from_millis(400))
        .with_finding(
            DiscoveredDevice::new("wifi-1", "Smart Bulb")
                .with_signal_strength(-48)
                .with_capability(PairingCapability::SoftAp)
                .with_capability(PairingCapability::ShortRangeRadio),
            DiscoveryMetadata {
                device_ssid: Some("SmartBulb-Setup".to_string()),
                supports_soft_ap: true,
                supports_short_range_radio: true,
                expected_wifi_password: Some(SecretString::from("password123".to_string())),
                ..Default::default()
            },
        );

    let mdns = FixtureStrategy::new("mdns")
        .with_delay(Duration::from_millis(250))
        .with_finding(
            DiscoveredDevice::new("mdns-1", "Wall Switch")
                .with_signal_strength(-61)
                .with_capability(PairingCapability::SoftAp),
            DiscoveryMetadata {
                device_ssid: Some("WallSwitch-Setup".to_string()),
                supports_soft_ap: true,
                ..Default::default()
            },
        );

    let ssdp = FixtureStrategy::new("ssdp").with_delay(Duration::from_millis(150));

    let ble = FixtureStrategy::new("ble")
        .with_delay(Duration::from_millis(600))
        .with_finding(
            DiscoveredDevice::new("ble-1", "Dimmer")
                .with_signal_strength(-72)
                .with_capability(PairingCapability::ShortRangeRadio),
            DiscoveryMetadata {
                supports_short_range_radio: true,
                ..Default::default()
            },
        );

    let strategies: Vec<Arc<dyn DiscoveryStrategy>> =
        vec![Arc::new(wifi), Arc::new(mdns), Arc::new(ssdp), Arc::new(ble)];
    strategies
}
