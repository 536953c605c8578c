//! Pairing orchestration tests

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use onboard::discovery::fixture::FixtureStrategy;
use onboard::discovery::models::{DiscoveredDevice, DiscoveryMetadata, PairingCapability};
use onboard::discovery::session::collect_states;
use onboard::discovery::strategy::DiscoveryStrategy;
use onboard::errors::OnboardError;
use onboard::http::client::{ApiRequest, ApiResponse};
use onboard::http::transport::ApiTransport;
use onboard::pairing::flow::{OnboardingFlow, OnboardingOutcome, RegistrationTarget};
use onboard::pairing::orchestrator::{ConnectionOrchestrator, PairingOutcome};
use onboard::provisioning::backend::BackendProvisioner;
use onboard::provisioning::bluetooth::BluetoothProvisioningStrategy;
use onboard::provisioning::models::{
    ProvisioningFailureReason, ProvisioningProgress, ProvisioningResult, WifiCredentials,
};
use onboard::provisioning::onboarding_code::OnboardingCodeProvisioningStrategy;
use onboard::provisioning::softap::SoftApProvisioningStrategy;
use onboard::provisioning::strategy::{ProgressFn, ProvisioningStrategy};
use onboard::registration::cache::InMemoryDeviceCache;
use onboard::registration::client::{DeviceRegistrationClient, RegistrationResult};
use onboard::utils::{SleepFn, SleepFuture};

/// Counts invocations and reports success for every device
struct CountingStrategy {
    id: &'static str,
    capability: PairingCapability,
    calls: AtomicUsize,
}

impl CountingStrategy {
    fn new(id: &'static str, capability: PairingCapability) -> Arc<Self> {
        Arc::new(Self {
            id,
            capability,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProvisioningStrategy for CountingStrategy {
    fn id(&self) -> &str {
        self.id
    }

    fn name(&self) -> &str {
        self.id
    }

    fn required_user_action(&self) -> &str {
        "Nothing to do"
    }

    fn capability(&self) -> Option<PairingCapability> {
        Some(self.capability)
    }

    fn supports(&self, metadata: &DiscoveryMetadata) -> bool {
        match self.capability {
            PairingCapability::SoftAp => metadata.supports_soft_ap,
            PairingCapability::ShortRangeRadio => metadata.supports_short_range_radio,
            PairingCapability::OnboardingCode => metadata.supports_onboarding_code,
        }
    }

    async fn provision(
        &self,
        _metadata: &DiscoveryMetadata,
        _credentials: &WifiCredentials,
        _on_progress: ProgressFn<'_>,
    ) -> ProvisioningResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        ProvisioningResult::Success(format!("{} done", self.id))
    }

    fn cancel(&self) {}
}

/// Answers each path with a canned response and records requests
#[derive(Default)]
struct ScriptedTransport {
    responses: HashMap<String, (StatusCode, String)>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    fn respond(mut self, path: &str, status: StatusCode, body: serde_json::Value) -> Self {
        self.responses.insert(path.to_string(), (status, body.to_string()));
        self
    }

    fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApiTransport for ScriptedTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, OnboardError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.get(&request.path) {
            Some((status, body)) => Ok(ApiResponse::new(*status, body.clone())),
            None => Ok(ApiResponse::new(StatusCode::NOT_FOUND, "")),
        }
    }
}

fn no_sleep() -> SleepFn {
    Arc::new(|_: Duration| -> SleepFuture { Box::pin(async {}) })
}

async fn orchestrator_with(
    device: DiscoveredDevice,
    metadata: DiscoveryMetadata,
    strategies: Vec<Arc<dyn ProvisioningStrategy>>,
) -> ConnectionOrchestrator {
    let discovery: Vec<Arc<dyn DiscoveryStrategy>> =
        vec![Arc::new(FixtureStrategy::new("fixture").with_finding(device, metadata))];
    let orchestrator = ConnectionOrchestrator::new(discovery, strategies);
    collect_states(orchestrator.discovery_states()).await;
    orchestrator
}

fn soft_ap_device() -> (DiscoveredDevice, DiscoveryMetadata) {
    (
        DiscoveredDevice::new("wifi-1", "Smart Bulb")
            .with_capability(PairingCapability::SoftAp)
            .with_capability(PairingCapability::ShortRangeRadio),
        DiscoveryMetadata {
            device_ssid: Some("SmartBulb-Setup".to_string()),
            supports_soft_ap: true,
            supports_short_range_radio: true,
            ..Default::default()
        },
    )
}

fn default_strategies() -> Vec<Arc<dyn ProvisioningStrategy>> {
    vec![
        Arc::new(SoftApProvisioningStrategy::default()),
        Arc::new(BluetoothProvisioningStrategy),
        Arc::new(OnboardingCodeProvisioningStrategy),
    ]
}

#[tokio::test]
async fn test_onboarding_code_only_device_selects_onboarding_code() {
    let device = DiscoveredDevice::new("qr-1", "Plug").with_capability(PairingCapability::OnboardingCode);
    let metadata = DiscoveryMetadata {
        supports_onboarding_code: true,
        ..Default::default()
    };
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    let selected = session.selected_strategy().unwrap();
    assert_eq!(selected.id(), "onboarding_code");
}

#[tokio::test]
async fn test_preferred_capability_wins_over_registration_order() {
    let (device, metadata) = soft_ap_device();
    let radio = CountingStrategy::new("radio", PairingCapability::ShortRangeRadio);
    let soft_ap = CountingStrategy::new("soft_ap", PairingCapability::SoftAp);
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> = vec![radio.clone(), soft_ap.clone()];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    let outcome = session.provision(&WifiCredentials::new("Home", "pw"), &|_| {}).await;

    assert!(outcome.is_paired());
    assert_eq!(soft_ap.calls(), 1);
    assert_eq!(radio.calls(), 0);
}

#[tokio::test]
async fn test_falls_back_to_first_supporting_strategy() {
    // advertises soft_ap only, but the metadata says the radio is the usable path
    let device = DiscoveredDevice::new("odd-1", "Sensor").with_capability(PairingCapability::SoftAp);
    let metadata = DiscoveryMetadata {
        supports_short_range_radio: true,
        ..Default::default()
    };
    let radio = CountingStrategy::new("radio", PairingCapability::ShortRangeRadio);
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> = vec![radio.clone()];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    assert_eq!(session.selected_strategy().unwrap().id(), "radio");
}

#[tokio::test]
async fn test_no_capable_strategy_is_unsupported_without_invocation() {
    let device = DiscoveredDevice::new("bare-1", "Mystery");
    let counting = CountingStrategy::new("soft_ap", PairingCapability::SoftAp);
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> = vec![counting.clone()];
    let orchestrator = orchestrator_with(device.clone(), DiscoveryMetadata::default(), strategies).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    assert!(session.available_strategies().is_empty());

    let outcome = session.provision(&WifiCredentials::new("Home", "pw"), &|_| {}).await;
    assert_eq!(
        outcome,
        PairingOutcome::Failed {
            reason: ProvisioningFailureReason::Unsupported,
            message: "No provisioning strategy available for Mystery".to_string(),
        }
    );
    assert_eq!(counting.calls(), 0);
}

#[tokio::test]
async fn test_unknown_device_has_no_session() {
    let (device, metadata) = soft_ap_device();
    let orchestrator = orchestrator_with(device, metadata, default_strategies()).await;

    let stranger = DiscoveredDevice::new("ghost", "Ghost");
    assert!(orchestrator.pairing_session_for(&stranger).is_none());
}

#[tokio::test]
async fn test_available_strategies_follow_registration_order() {
    let (device, metadata) = soft_ap_device();
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    let ids: Vec<_> = session
        .available_strategies()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["soft_ap", "bluetooth_fallback"]);
}

#[tokio::test]
async fn test_bluetooth_only_device_reports_unsupported() {
    let device = DiscoveredDevice::new("ble-1", "Dimmer").with_capability(PairingCapability::ShortRangeRadio);
    let metadata = DiscoveryMetadata {
        supports_short_range_radio: true,
        ..Default::default()
    };
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    let outcome = session.provision(&WifiCredentials::new("Home", "pw"), &|_| {}).await;
    assert!(matches!(
        outcome,
        PairingOutcome::Failed {
            reason: ProvisioningFailureReason::Unsupported,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_forwarded_to_running_strategy() {
    let (device, metadata) = soft_ap_device();
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;
    let session = Arc::new(orchestrator.pairing_session_for(&device).unwrap());

    let canceller = Arc::clone(&session);
    let on_progress = move |p: ProvisioningProgress| {
        if p == ProvisioningProgress::SendingCredentials {
            canceller.cancel();
        }
    };
    let outcome = session
        .provision(&WifiCredentials::new("Home", "pw"), &on_progress)
        .await;

    assert_eq!(
        outcome,
        PairingOutcome::Failed {
            reason: ProvisioningFailureReason::Cancelled,
            message: "Provisioning cancelled".to_string(),
        }
    );
}

#[tokio::test]
async fn test_cancel_without_attempt_is_noop() {
    let (device, metadata) = soft_ap_device();
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();
    session.cancel();
}

#[tokio::test]
async fn test_backend_receives_selected_strategy() {
    let (device, metadata) = soft_ap_device();
    let transport = Arc::new(ScriptedTransport::default().respond(
        "/api/v1/provisioning/devices/wifi-1",
        StatusCode::OK,
        json!({
            "device_id": "wifi-1",
            "strategy": "wifi",
            "adapter": "mqtt",
            "status": "succeeded",
            "steps": [{"stage": "confirm", "status": "succeeded", "detail": "online"}]
        }),
    ));
    let local = CountingStrategy::new("soft_ap", PairingCapability::SoftAp);
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> = vec![local.clone()];
    let discovery: Vec<Arc<dyn DiscoveryStrategy>> =
        vec![Arc::new(FixtureStrategy::new("fixture").with_finding(device.clone(), metadata))];
    let orchestrator = ConnectionOrchestrator::new(discovery, strategies)
        .with_backend(Arc::new(BackendProvisioner::new(transport.clone())));
    collect_states(orchestrator.discovery_states()).await;

    let session = orchestrator.pairing_session_for(&device).unwrap();
    let outcome = session.provision(&WifiCredentials::new("Home", "pw"), &|_| {}).await;

    assert!(outcome.is_paired());
    assert_eq!(local.calls(), 0);
    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    let body = requests[0].body.as_ref().unwrap();
    assert_eq!(body["strategy"], json!("wifi"));
    assert_eq!(body["device_type"], json!("wifi"));
    assert_eq!(body["payload"]["simulated"], json!(true));
}

#[tokio::test]
async fn test_onboarding_flow_registers_paired_device() {
    let (device, metadata) = soft_ap_device();
    let counting = CountingStrategy::new("soft_ap", PairingCapability::SoftAp);
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> = vec![counting];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();

    let transport = Arc::new(ScriptedTransport::default().respond(
        "/api/locations/home/zones/kitchen/devices",
        StatusCode::CREATED,
        json!({"device_id": "wifi-1", "name": "Kitchen Bulb", "zone_id": "kitchen", "owner_id": "u1"}),
    ));
    let cache = Arc::new(InMemoryDeviceCache::new());
    let client = Arc::new(DeviceRegistrationClient::with_sleep(
        transport.clone(),
        cache.clone(),
        no_sleep(),
    ));
    let flow = OnboardingFlow::new(client, 2, Duration::from_millis(10));
    let target = RegistrationTarget {
        location_id: "home".to_string(),
        zone_id: "kitchen".to_string(),
        name: Some("Kitchen Bulb".to_string()),
    };

    let outcome = flow
        .pair_and_register(&session, &WifiCredentials::new("Home", "pw"), &target, &|_| {})
        .await;

    let OnboardingOutcome::Registered(registered) = outcome else {
        panic!("expected registration, got {:?}", outcome);
    };
    assert_eq!(registered.device_id, "wifi-1");
    assert_eq!(registered.location_id, "home");
    assert_eq!(cache.get("wifi-1").map(|d| d.name), Some("Kitchen Bulb".to_string()));

    let body = transport.requests()[0].body.clone().unwrap();
    assert_eq!(body["name"], json!("Kitchen Bulb"));
}

#[tokio::test]
async fn test_onboarding_flow_skips_registration_when_pairing_fails() {
    let device = DiscoveredDevice::new("ble-1", "Dimmer").with_capability(PairingCapability::ShortRangeRadio);
    let metadata = DiscoveryMetadata {
        supports_short_range_radio: true,
        ..Default::default()
    };
    let orchestrator = orchestrator_with(device.clone(), metadata, default_strategies()).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();

    let transport = Arc::new(ScriptedTransport::default());
    let client = Arc::new(DeviceRegistrationClient::with_sleep(
        transport.clone(),
        Arc::new(InMemoryDeviceCache::new()),
        no_sleep(),
    ));
    let flow = OnboardingFlow::new(client, 2, Duration::from_millis(10));
    let target = RegistrationTarget {
        location_id: "home".to_string(),
        zone_id: "hall".to_string(),
        name: None,
    };

    let outcome = flow
        .pair_and_register(&session, &WifiCredentials::new("Home", "pw"), &target, &|_| {})
        .await;

    assert!(matches!(
        outcome,
        OnboardingOutcome::PairingFailed {
            reason: ProvisioningFailureReason::Unsupported,
            ..
        }
    ));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn test_onboarding_flow_reports_conflict() {
    let (device, metadata) = soft_ap_device();
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> =
        vec![CountingStrategy::new("soft_ap", PairingCapability::SoftAp)];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();

    let transport = Arc::new(ScriptedTransport::default().respond(
        "/api/locations/home/zones/hall/devices",
        StatusCode::CONFLICT,
        json!({"message": "Device already exists"}),
    ));
    let client = Arc::new(DeviceRegistrationClient::with_sleep(
        transport,
        Arc::new(InMemoryDeviceCache::new()),
        no_sleep(),
    ));
    let flow = OnboardingFlow::new(client, 2, Duration::from_millis(10));
    let target = RegistrationTarget {
        location_id: "home".to_string(),
        zone_id: "hall".to_string(),
        name: None,
    };

    let outcome = flow
        .pair_and_register(&session, &WifiCredentials::new("Home", "pw"), &target, &|_| {})
        .await;
    match outcome {
        OnboardingOutcome::RegistrationFailed(RegistrationResult::Conflict(reason)) => {
            assert_eq!(reason.as_deref(), Some("Device already exists"));
        }
        other => panic!("expected conflict, got {:?}", other),
    }
}

fn hall_target() -> RegistrationTarget {
    RegistrationTarget {
        location_id: "home".to_string(),
        zone_id: "hall".to_string(),
        name: None,
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_registration_drops_pending_retries() {
    let (device, metadata) = soft_ap_device();
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> =
        vec![CountingStrategy::new("soft_ap", PairingCapability::SoftAp)];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();

    let transport = Arc::new(ScriptedTransport::default().respond(
        "/api/locations/home/zones/hall/devices",
        StatusCode::SERVICE_UNAVAILABLE,
        json!({}),
    ));
    // real timer: the first backoff wait is still pending when the cancel lands
    let client = Arc::new(DeviceRegistrationClient::new(
        transport.clone(),
        Arc::new(InMemoryDeviceCache::new()),
    ));
    let flow = OnboardingFlow::new(client, 3, Duration::from_secs(60));

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let started = tokio::time::Instant::now();
    let outcome = flow
        .pair_and_register_until(&session, &WifiCredentials::new("Home", "pw"), &hall_target(), &|_| {}, &cancel)
        .await;

    assert!(matches!(outcome, OnboardingOutcome::Cancelled), "got {:?}", outcome);
    assert_eq!(transport.requests().len(), 1);
    assert!(started.elapsed() < Duration::from_secs(60));
}

#[tokio::test]
async fn test_cancel_before_registration_skips_backend() {
    let (device, metadata) = soft_ap_device();
    let strategies: Vec<Arc<dyn ProvisioningStrategy>> =
        vec![CountingStrategy::new("soft_ap", PairingCapability::SoftAp)];
    let orchestrator = orchestrator_with(device.clone(), metadata, strategies).await;
    let session = orchestrator.pairing_session_for(&device).unwrap();

    let transport = Arc::new(ScriptedTransport::default());
    let client = Arc::new(DeviceRegistrationClient::with_sleep(
        transport.clone(),
        Arc::new(InMemoryDeviceCache::new()),
        no_sleep(),
    ));
    let flow = OnboardingFlow::new(client, 2, Duration::from_millis(10));

    let cancel = CancellationToken::new();
    cancel.cancel();
    let outcome = flow
        .pair_and_register_until(&session, &WifiCredentials::new("Home", "pw"), &hall_target(), &|_| {}, &cancel)
        .await;

    assert!(matches!(outcome, OnboardingOutcome::Cancelled), "got {:?}", outcome);
    assert!(transport.requests().is_empty());
}
