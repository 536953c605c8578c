//! Discovery models

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Onboarding methods a device can advertise
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PairingCapability {
    #[serde(rename = "soft_ap")]
    SoftAp,
    #[serde(rename = "bluetooth")]
    ShortRangeRadio,
    #[serde(rename = "onboarding_code")]
    OnboardingCode,
}

impl PairingCapability {
    /// Order in which onboarding methods are tried
    pub const PREFERENCE_ORDER: [PairingCapability; 3] = [
        PairingCapability::SoftAp,
        PairingCapability::ShortRangeRadio,
        PairingCapability::OnboardingCode,
    ];

    /// Name used on the wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            PairingCapability::SoftAp => "soft_ap",
            PairingCapability::ShortRangeRadio => "bluetooth",
            PairingCapability::OnboardingCode => "onboarding_code",
        }
    }
}

/// A device sighted by a discovery strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Identity, unique within one discovery session
    pub id: String,

    /// Display name
    pub name: String,

    /// Signal strength hint (dBm) when the transport reports one
    #[serde(default)]
    pub signal_strength: Option<i32>,

    /// Advertised pairing capabilities, in advertised order
    #[serde(default)]
    pub capabilities: Vec<PairingCapability>,
}

impl DiscoveredDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            signal_strength: None,
            capabilities: Vec::new(),
        }
    }

    pub fn with_capability(mut self, capability: PairingCapability) -> Self {
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    pub fn with_signal_strength(mut self, dbm: i32) -> Self {
        self.signal_strength = Some(dbm);
        self
    }

    /// Advertised capabilities in preference order
    pub fn preferred_capabilities(&self) -> impl Iterator<Item = PairingCapability> + '_ {
        PairingCapability::PREFERENCE_ORDER
            .into_iter()
            .filter(|c| self.capabilities.contains(c))
    }
}

/// Transport-specific facts retained for provisioning
#[derive(Debug, Clone)]
pub struct DiscoveryMetadata {
    /// Network name the device broadcasts while in setup mode
    pub device_ssid: Option<String>,

    pub supports_soft_ap: bool,

    pub supports_short_range_radio: bool,

    pub supports_onboarding_code: bool,

    /// Whether the device access point is currently reachable
    pub device_ap_reachable: bool,

    /// Shared secret the device expects, when the transport reveals it
    pub expected_wifi_password: Option<SecretString>,

    /// Whether the device answers liveness probes
    pub responds_to_heartbeat: bool,

    /// Sighting comes from simulated data rather than a physical scan
    pub simulated: bool,
}

impl Default for DiscoveryMetadata {
    fn default() -> Self {
        Self {
            device_ssid: None,
            supports_soft_ap: false,
            supports_short_range_radio: false,
            supports_onboarding_code: false,
            device_ap_reachable: true,
            expected_wifi_password: None,
            responds_to_heartbeat: true,
            simulated: false,
        }
    }
}

/// One sighting: the consumer-facing device plus its retained metadata
#[derive(Debug, Clone)]
pub struct DiscoveryFinding {
    pub device: DiscoveredDevice,
    pub metadata: DiscoveryMetadata,
}

impl DiscoveryFinding {
    pub fn new(device: DiscoveredDevice, metadata: DiscoveryMetadata) -> Self {
        Self { device, metadata }
    }
}

/// States emitted by a discovery run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DiscoverySessionState {
    #[default]
    Idle,
    Discovering {
        progress: u8,
    },
    Results(Vec<DiscoveredDevice>),
    NoResults,
    Error(String),
}

impl DiscoverySessionState {
    /// True for the states that end a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DiscoverySessionState::Results(_)
                | DiscoverySessionState::NoResults
                | DiscoverySessionState::Error(_)
        )
    }
}
