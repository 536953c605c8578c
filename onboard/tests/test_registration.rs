//! Device registration tests against a mock backend

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use onboard::authn::tokens::{AuthTokens, TokenStore};
use onboard::http::auth::AuthApi;
use onboard::http::client::HttpClient;
use onboard::http::transport::AuthenticatedTransport;
use onboard::registration::cache::InMemoryDeviceCache;
use onboard::registration::client::{DeviceRegistrationClient, DeviceRegistrationRequest, RegistrationResult};
use onboard::utils::{SleepFn, SleepFuture};

const DEVICES_PATH: &str = "/api/locations/home/zones/kitchen/devices";

struct Harness {
    client: DeviceRegistrationClient,
    cache: Arc<InMemoryDeviceCache>,
    delays: Arc<Mutex<Vec<Duration>>>,
}

async fn harness(base_url: &str) -> Harness {
    let http_client = Arc::new(HttpClient::new(base_url, Duration::from_secs(5)).unwrap());
    let tokens = Arc::new(TokenStore::new());
    tokens
        .replace(AuthTokens::new("access-1", Some("refresh-1".to_string())))
        .await
        .unwrap();
    let refresher = Arc::new(AuthApi::new(http_client.clone()));
    let transport = Arc::new(AuthenticatedTransport::new(http_client, tokens, refresher));

    let delays = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&delays);
    let sleep: SleepFn = Arc::new(move |wait: Duration| -> SleepFuture {
        recorded.lock().unwrap().push(wait);
        Box::pin(async {})
    });

    let cache = Arc::new(InMemoryDeviceCache::new());
    Harness {
        client: DeviceRegistrationClient::with_sleep(transport, cache.clone(), sleep),
        cache,
        delays,
    }
}

fn kitchen_bulb() -> DeviceRegistrationRequest {
    DeviceRegistrationRequest {
        device_id: "wifi-1".to_string(),
        name: "Kitchen Bulb".to_string(),
        location_id: "home".to_string(),
        zone_id: "kitchen".to_string(),
    }
}

fn registered_body() -> serde_json::Value {
    json!({"device_id": "wifi-1", "name": "Kitchen Bulb", "zone_id": "kitchen", "owner_id": "user-7"})
}

#[tokio::test]
async fn test_retries_server_errors_then_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .and(header("authorization", "Bearer access-1"))
        .and(body_partial_json(json!({"device_id": "wifi-1", "name": "Kitchen Bulb"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(registered_body()))
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 2, Duration::from_millis(100))
        .await;

    let RegistrationResult::Success(metadata) = result else {
        panic!("expected success, got {:?}", result);
    };
    assert_eq!(metadata.device_id, "wifi-1");
    assert_eq!(metadata.owner_id.as_deref(), Some("user-7"));
    assert_eq!(metadata.location_id, "home");

    assert_eq!(server.received_requests().await.unwrap().len(), 3);
    assert_eq!(
        *h.delays.lock().unwrap(),
        vec![Duration::from_millis(100), Duration::from_millis(200)]
    );
    assert!(h.cache.get("wifi-1").is_some());
    assert_eq!(h.cache.refresh_count(), 1);
}

#[tokio::test]
async fn test_conflict_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({"message": "Device already exists"})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 3, Duration::from_millis(100))
        .await;

    match result {
        RegistrationResult::Conflict(reason) => assert_eq!(reason.as_deref(), Some("Device already exists")),
        other => panic!("expected conflict, got {:?}", other),
    }
    assert!(h.delays.lock().unwrap().is_empty());
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_conflict_without_body_has_no_reason() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(409))
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 0, Duration::from_millis(100))
        .await;
    assert!(matches!(result, RegistrationResult::Conflict(None)), "got {:?}", result);
}

#[tokio::test]
async fn test_client_error_fails_immediately() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(404).set_body_string("zone not found"))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 3, Duration::from_millis(100))
        .await;

    let RegistrationResult::UnexpectedFailure(err) = result else {
        panic!("expected unexpected failure, got {:?}", result);
    };
    assert_eq!(err.status(), Some(404));
    assert!(h.delays.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_are_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 2, Duration::from_millis(50))
        .await;

    let RegistrationResult::TransientFailure(err) = result else {
        panic!("expected transient failure, got {:?}", result);
    };
    assert_eq!(err.status(), Some(503));
    // no sleep after the final attempt
    assert_eq!(h.delays.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_unreachable_backend_is_transient() {
    // nothing listens on the discard port
    let h = harness("http://127.0.0.1:9").await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 1, Duration::from_millis(10))
        .await;

    let RegistrationResult::TransientFailure(err) = result else {
        panic!("expected transient failure, got {:?}", result);
    };
    assert!(err.is_transport());
    assert_eq!(h.delays.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_success_body_is_unexpected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let h = harness(&server.uri()).await;
    let result = h
        .client
        .register_device(&kitchen_bulb(), 2, Duration::from_millis(10))
        .await;

    let RegistrationResult::UnexpectedFailure(err) = result else {
        panic!("expected unexpected failure, got {:?}", result);
    };
    assert!(err.to_string().contains("Empty response"));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_dropping_the_call_stops_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(DEVICES_PATH))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let http_client = Arc::new(HttpClient::new(&server.uri(), Duration::from_secs(5)).unwrap());
    let tokens = Arc::new(TokenStore::new());
    let refresher = Arc::new(AuthApi::new(http_client.clone()));
    let transport = Arc::new(AuthenticatedTransport::new(http_client, tokens, refresher));
    // real timer so the retry wait outlives the caller
    let client = DeviceRegistrationClient::new(transport, Arc::new(InMemoryDeviceCache::new()));

    let outcome = tokio::time::timeout(
        Duration::from_millis(500),
        client.register_device(&kitchen_bulb(), 5, Duration::from_secs(10)),
    )
    .await;
    assert!(outcome.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
