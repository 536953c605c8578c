//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::{AppOptions, DiscoveryOptions};
use crate::authn::service::AuthService;
use crate::authn::tokens::TokenStore;
use crate::devicestate::hub::DeviceStateHub;
use crate::discovery::fixture::standard_fixtures;
use crate::discovery::lan::LanProbeStrategy;
use crate::discovery::strategy::DiscoveryStrategy;
use crate::errors::OnboardError;
use crate::http::auth::AuthApi;
use crate::http::client::HttpClient;
use crate::http::transport::AuthenticatedTransport;
use crate::pairing::flow::OnboardingFlow;
use crate::pairing::orchestrator::ConnectionOrchestrator;
use crate::provisioning::backend::BackendProvisioner;
use crate::provisioning::bluetooth::BluetoothProvisioningStrategy;
use crate::provisioning::onboarding_code::OnboardingCodeProvisioningStrategy;
use crate::provisioning::softap::SoftApProvisioningStrategy;
use crate::provisioning::strategy::ProvisioningStrategy;
use crate::registration::cache::InMemoryDeviceCache;
use crate::registration::client::DeviceRegistrationClient;
use crate::storage::secrets::FileSecretStore;

/// Main application state
pub struct AppState {
    /// HTTP client for backend communication
    pub http_client: Arc<HttpClient>,

    /// Current token pair
    pub tokens: Arc<TokenStore>,

    /// Bearer-attaching transport used by every authenticated call
    pub transport: Arc<AuthenticatedTransport>,

    /// Login and logout
    pub auth: Arc<AuthService>,

    /// Discovery and pairing entry point
    pub orchestrator: Arc<ConnectionOrchestrator>,

    /// Registered devices
    pub devices: Arc<InMemoryDeviceCache>,

    /// Pair-then-register flow
    pub onboarding: Arc<OnboardingFlow>,

    /// State streams of paired devices
    pub device_states: Arc<DeviceStateHub>,
}

impl AppState {
    /// Initialize application state
    pub async fn init(options: &AppOptions) -> Result<Self, OnboardError> {
        info!("Initializing application state...");

        let http_client = Arc::new(HttpClient::new(
            &options.backend_base_url,
            options.request_timeout,
        )?);

        // Token store backed by the secrets file
        let secrets = Arc::new(FileSecretStore::new(options.layout.secrets_file()));
        let tokens = Arc::new(TokenStore::with_secret_store(secrets));
        match tokens.restore().await {
            Ok(true) => info!("Restored persisted session"),
            Ok(false) => info!("No persisted session, continuing unauthenticated"),
            Err(e) => warn!("Failed to restore persisted session: {}", e),
        }

        let auth_api = Arc::new(AuthApi::new(http_client.clone()));
        let transport = Arc::new(AuthenticatedTransport::new(
            http_client.clone(),
            tokens.clone(),
            auth_api.clone(),
        ));
        let auth = Arc::new(AuthService::new(auth_api, tokens.clone(), transport.clone()));

        let mut orchestrator = ConnectionOrchestrator::new(
            discovery_strategies(&options.discovery),
            provisioning_strategies(options),
        );
        if options.use_backend_provisioning {
            info!("Provisioning is delegated to the backend");
            orchestrator = orchestrator.with_backend(Arc::new(BackendProvisioner::new(transport.clone())));
        }

        let devices = Arc::new(InMemoryDeviceCache::new());
        let registration = Arc::new(DeviceRegistrationClient::new(transport.clone(), devices.clone()));
        let onboarding = Arc::new(OnboardingFlow::new(
            registration,
            options.registration.max_retries,
            options.registration.initial_delay,
        ));

        Ok(Self {
            http_client,
            tokens,
            transport,
            auth,
            orchestrator: Arc::new(orchestrator),
            devices,
            onboarding,
            device_states: Arc::new(DeviceStateHub::new()),
        })
    }
}

fn discovery_strategies(options: &DiscoveryOptions) -> Vec<Arc<dyn DiscoveryStrategy>> {
    let mut strategies: Vec<Arc<dyn DiscoveryStrategy>> = Vec::new();

    if let Some(cidr) = &options.lan_cidr {
        strategies.push(Arc::new(LanProbeStrategy::new(
            cidr.clone(),
            options.lan_probe_ports.clone(),
            options.lan_probe_timeout,
        )));
    }
    if options.use_fixtures {
        strategies.extend(standard_fixtures());
    }

    info!("Configured {} discovery strategies", strategies.len());
    strategies
}

fn provisioning_strategies(options: &AppOptions) -> Vec<Arc<dyn ProvisioningStrategy>> {
    vec![
        Arc::new(SoftApProvisioningStrategy::with_timeouts(options.soft_ap_timeouts)),
        Arc::new(BluetoothProvisioningStrategy),
        Arc::new(OnboardingCodeProvisioningStrategy),
    ]
}
