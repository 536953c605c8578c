//! Application configuration options

use std::time::Duration;

use crate::provisioning::softap::SoftApTimeouts;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Backend API base URL
    pub backend_base_url: String,

    /// Timeout of a single backend request
    pub request_timeout: Duration,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Discovery configuration
    pub discovery: DiscoveryOptions,

    /// SoftAP phase budgets
    pub soft_ap_timeouts: SoftApTimeouts,

    /// Delegate provisioning to the backend pipeline
    pub use_backend_provisioning: bool,

    /// Registration retry budget
    pub registration: RegistrationOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

impl AppOptions {
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            backend_base_url: settings.backend.base_url.clone(),
            request_timeout: Duration::from_secs(settings.backend.request_timeout_secs),
            layout,
            discovery: DiscoveryOptions {
                lan_cidr: settings.discovery.lan_cidr.clone(),
                lan_probe_ports: settings.discovery.lan_probe_ports.clone(),
                lan_probe_timeout: Duration::from_millis(settings.discovery.lan_probe_timeout_ms),
                use_fixtures: settings.discovery.use_fixtures,
            },
            soft_ap_timeouts: SoftApTimeouts::from(&settings.provisioning.soft_ap),
            use_backend_provisioning: settings.provisioning.use_backend,
            registration: RegistrationOptions {
                max_retries: settings.registration.max_retries,
                initial_delay: settings.registration.initial_delay(),
            },
        }
    }
}

/// Which discovery strategies are configured
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Subnet for the LAN probe; no probe when unset
    pub lan_cidr: Option<String>,

    pub lan_probe_ports: Vec<u16>,

    pub lan_probe_timeout: Duration,

    /// Include the simulated transports
    pub use_fixtures: bool,
}

/// Registration retry options
#[derive(Debug, Clone, Copy)]
pub struct RegistrationOptions {
    /// Retries after the first attempt
    pub max_retries: u32,

    /// First backoff delay, doubled after each retry
    pub initial_delay: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_follow_settings() {
        let mut settings = Settings::default();
        settings.discovery.lan_cidr = Some("192.168.1.0/24".to_string());
        settings.registration.max_retries = 5;
        settings.provisioning.use_backend = true;

        let options = AppOptions::from_settings(&settings, StorageLayout::new("/tmp/onboard"));
        assert_eq!(options.discovery.lan_cidr.as_deref(), Some("192.168.1.0/24"));
        assert_eq!(options.registration.max_retries, 5);
        assert!(options.use_backend_provisioning);
        assert_eq!(options.soft_ap_timeouts, SoftApTimeouts::default());
    }
}
