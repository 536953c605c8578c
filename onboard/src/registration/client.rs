//! Device registration with retry and outcome classification

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use http::StatusCode;
use openapi_client::{DeviceConflictResponse, DeviceRegistrationBody, DeviceRegistrationResponse};
use tracing::{error, info, warn};

use crate::errors::OnboardError;
use crate::http::client::{ApiRequest, ApiResponse};
use crate::http::transport::ApiTransport;
use crate::registration::cache::{DeviceCache, DeviceMetadata};
use crate::utils::{tokio_sleep, Backoff, SleepFn};

/// A physically provisioned device to record server-side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRegistrationRequest {
    pub device_id: String,
    pub name: String,
    pub location_id: String,
    pub zone_id: String,
}

impl DeviceRegistrationRequest {
    fn path(&self) -> String {
        format!(
            "/api/locations/{}/zones/{}/devices",
            self.location_id, self.zone_id
        )
    }
}

#[derive(Debug)]
pub enum RegistrationResult {
    Success(DeviceMetadata),
    /// The backend already knows the device; carries its explanation if any
    Conflict(Option<String>),
    /// Retry budget spent on server or network trouble
    TransientFailure(OnboardError),
    /// Retrying would not help
    UnexpectedFailure(OnboardError),
}

impl RegistrationResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RegistrationResult::Success(_))
    }
}

/// Registers devices and hands successful ones to the local cache.
///
/// Dropping a pending `register_device` future abandons its remaining
/// retries without further network calls.
pub struct DeviceRegistrationClient {
    transport: Arc<dyn ApiTransport>,
    cache: Arc<dyn DeviceCache>,
    sleep: SleepFn,
}

impl DeviceRegistrationClient {
    pub fn new(transport: Arc<dyn ApiTransport>, cache: Arc<dyn DeviceCache>) -> Self {
        Self::with_sleep(transport, cache, tokio_sleep())
    }

    pub fn with_sleep(transport: Arc<dyn ApiTransport>, cache: Arc<dyn DeviceCache>, sleep: SleepFn) -> Self {
        Self {
            transport,
            cache,
            sleep,
        }
    }

    /// Attempt registration up to `max_retries + 1` times
    pub async fn register_device(
        &self,
        request: &DeviceRegistrationRequest,
        max_retries: u32,
        initial_delay: Duration,
    ) -> RegistrationResult {
        let body = DeviceRegistrationBody {
            device_id: request.device_id.clone(),
            name: request.name.clone(),
        };
        let api_request = match ApiRequest::post(request.path(), &body) {
            Ok(api_request) => api_request,
            Err(e) => return RegistrationResult::UnexpectedFailure(e),
        };

        let attempts = max_retries.saturating_add(1);
        let mut backoff = Backoff::new(initial_delay);
        let mut last_error: Option<OnboardError> = None;

        for attempt in 1..=attempts {
            info!(
                "Registering device {} (attempt {}/{})",
                request.device_id, attempt, attempts
            );

            match self.transport.execute(api_request.clone()).await {
                Ok(response) if response.is_success() => {
                    return self.complete(request, response).await;
                }
                Ok(response) if response.status == StatusCode::CONFLICT => {
                    warn!("Device {} already registered", request.device_id);
                    return RegistrationResult::Conflict(conflict_reason(&response.body));
                }
                Ok(response) if response.status.is_server_error() => {
                    warn!(
                        "Registration of {} hit server error {}",
                        request.device_id, response.status
                    );
                    last_error = Some(response.into_error());
                }
                Ok(response) => {
                    error!(
                        "Registration of {} rejected with {}",
                        request.device_id, response.status
                    );
                    return RegistrationResult::UnexpectedFailure(response.into_error());
                }
                Err(e) if e.is_transport() => {
                    warn!("Registration of {} failed in transit: {}", request.device_id, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Registration of {} failed: {}", request.device_id, e);
                    return RegistrationResult::UnexpectedFailure(e);
                }
            }

            if attempt < attempts {
                let delay = backoff.next_delay();
                info!("Retrying registration of {} in {:?}", request.device_id, delay);
                (self.sleep)(delay).await;
            }
        }

        match last_error {
            Some(e) if is_transient(&e) => RegistrationResult::TransientFailure(e),
            Some(e) => RegistrationResult::UnexpectedFailure(e),
            None => RegistrationResult::UnexpectedFailure(OnboardError::RegistrationError(
                "Unknown transient failure".to_string(),
            )),
        }
    }

    async fn complete(&self, request: &DeviceRegistrationRequest, response: ApiResponse) -> RegistrationResult {
        if response.body.trim().is_empty() {
            return RegistrationResult::UnexpectedFailure(OnboardError::RegistrationError(
                "Empty response from device registration".to_string(),
            ));
        }
        let registered: DeviceRegistrationResponse = match response.json() {
            Ok(registered) => registered,
            Err(e) => return RegistrationResult::UnexpectedFailure(e),
        };

        let metadata = DeviceMetadata {
            device_id: registered.device_id,
            name: registered.name,
            location_id: request.location_id.clone(),
            zone_id: registered.zone_id,
            owner_id: registered.owner_id,
            registered_at: Utc::now(),
        };

        // the backend already holds the device, a local cache miss is recoverable
        if let Err(e) = self.cache.save_device(&metadata).await {
            warn!("Failed to cache device {}: {}", metadata.device_id, e);
        } else if let Err(e) = self.cache.refresh_devices().await {
            warn!("Failed to refresh device cache: {}", e);
        }

        info!("Device {} registered in zone {}", metadata.device_id, metadata.zone_id);
        RegistrationResult::Success(metadata)
    }
}

fn is_transient(err: &OnboardError) -> bool {
    err.is_transport() || err.status().is_some_and(|s| s >= 500)
}

fn conflict_reason(body: &str) -> Option<String> {
    if body.trim().is_empty() {
        return None;
    }
    match serde_json::from_str::<DeviceConflictResponse>(body) {
        Ok(DeviceConflictResponse { message: Some(message) }) => Some(message),
        _ => Some(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_reason_prefers_message() {
        assert_eq!(
            conflict_reason(r#"{"message": "Device already exists"}"#),
            Some("Device already exists".to_string())
        );
        assert_eq!(conflict_reason("duplicate"), Some("duplicate".to_string()));
        assert_eq!(conflict_reason(""), None);
    }

    #[test]
    fn test_transient_classification() {
        let server = OnboardError::HttpStatus {
            status: 503,
            body: String::new(),
        };
        let client = OnboardError::HttpStatus {
            status: 404,
            body: String::new(),
        };
        assert!(is_transient(&server));
        assert!(!is_transient(&client));
        assert!(is_transient(&OnboardError::IoError(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused"
        ))));
    }

    #[test]
    fn test_path_is_scoped_by_location_and_zone() {
        let request = DeviceRegistrationRequest {
            device_id: "d1".to_string(),
            name: "Bulb".to_string(),
            location_id: "home".to_string(),
            zone_id: "kitchen".to_string(),
        };
        assert_eq!(request.path(), "/api/locations/home/zones/kitchen/devices");
    }
}
