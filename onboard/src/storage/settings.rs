//! Settings file management

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::OnboardError;
use crate::logs::LogLevel;

/// Agent settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON formatted logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Directory for rolling log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Discovery configuration
    #[serde(default)]
    pub discovery: DiscoverySettings,

    /// Provisioning configuration
    #[serde(default)]
    pub provisioning: ProvisioningSettings,

    /// Registration retry configuration
    #[serde(default)]
    pub registration: RegistrationSettings,
}

impl Settings {
    /// Check values that serde cannot
    pub fn validate(&self) -> Result<(), OnboardError> {
        url::Url::parse(&self.backend.base_url)?;
        if let Some(cidr) = &self.discovery.lan_cidr {
            cidr.parse::<ipnet::Ipv4Net>().map_err(|e| {
                OnboardError::ConfigError(format!("Invalid discovery CIDR {}: {}", cidr, e))
            })?;
        }
        if self.discovery.lan_probe_ports.is_empty() && self.discovery.lan_cidr.is_some() {
            return Err(OnboardError::ConfigError(
                "LAN discovery requires at least one probe port".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_backend_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySettings {
    /// IPv4 subnet to probe, e.g. "192.168.1.0/24". LAN probing is off when absent.
    #[serde(default)]
    pub lan_cidr: Option<String>,

    /// TCP ports probed on each LAN host
    #[serde(default = "default_probe_ports")]
    pub lan_probe_ports: Vec<u16>,

    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub lan_probe_timeout_ms: u64,

    /// Register the simulated fixture transports
    #[serde(default = "default_true")]
    pub use_fixtures: bool,
}

fn default_probe_ports() -> Vec<u16> {
    vec![80, 8080]
}

fn default_probe_timeout_ms() -> u64 {
    500
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            lan_cidr: None,
            lan_probe_ports: default_probe_ports(),
            lan_probe_timeout_ms: default_probe_timeout_ms(),
            use_fixtures: true,
        }
    }
}

/// Provisioning settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// SoftAP phase timeouts
    #[serde(default)]
    pub soft_ap: SoftApTimeoutSettings,

    /// Delegate provisioning to the backend pipeline instead of running it locally
    #[serde(default)]
    pub use_backend: bool,
}

/// SoftAP phase timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftApTimeoutSettings {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_credential_ack_timeout_ms")]
    pub credential_ack_timeout_ms: u64,

    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    15_000
}

fn default_credential_ack_timeout_ms() -> u64 {
    20_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    20_000
}

impl Default for SoftApTimeoutSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            credential_ack_timeout_ms: default_credential_ack_timeout_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
        }
    }
}

/// Registration retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationSettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

impl RegistrationSettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}
