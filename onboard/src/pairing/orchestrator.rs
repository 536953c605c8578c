//! Discovery-to-provisioning orchestration
//!
//! Consumers only deal with [`DiscoveredDevice`] values. The orchestrator
//! keeps the transport-specific metadata behind the discovery session and
//! uses it to pick a provisioning strategy for the device the user selected.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::discovery::models::{DiscoveredDevice, DiscoveryMetadata, DiscoverySessionState};
use crate::discovery::session::DiscoverySession;
use crate::discovery::strategy::DiscoveryStrategy;
use crate::provisioning::backend::BackendProvisioner;
use crate::provisioning::models::{
    ProvisioningFailureReason, ProvisioningResult, ProvisioningStrategySummary, WifiCredentials,
};
use crate::provisioning::strategy::{ProgressFn, ProvisioningStrategy};

/// A device that joined the home network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairedDevice {
    pub id: String,
    pub name: String,
}

/// Outcome of one pairing attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired(PairedDevice),
    Failed {
        reason: ProvisioningFailureReason,
        message: String,
    },
}

impl PairingOutcome {
    pub fn is_paired(&self) -> bool {
        matches!(self, PairingOutcome::Paired(_))
    }
}

/// Entry point for consumers: discover, then pair one selected device
pub struct ConnectionOrchestrator {
    discovery: Arc<DiscoverySession>,
    strategies: Vec<Arc<dyn ProvisioningStrategy>>,
    backend: Option<Arc<BackendProvisioner>>,
}

impl ConnectionOrchestrator {
    pub fn new(
        discovery_strategies: Vec<Arc<dyn DiscoveryStrategy>>,
        provisioning_strategies: Vec<Arc<dyn ProvisioningStrategy>>,
    ) -> Self {
        Self {
            discovery: Arc::new(DiscoverySession::new(discovery_strategies)),
            strategies: provisioning_strategies,
            backend: None,
        }
    }

    /// Run provisioning on the backend instead of locally
    pub fn with_backend(mut self, backend: Arc<BackendProvisioner>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn discovery(&self) -> &Arc<DiscoverySession> {
        &self.discovery
    }

    /// Start a discovery run
    pub fn discovery_states(&self) -> mpsc::Receiver<DiscoverySessionState> {
        self.discovery.discover()
    }

    pub fn cancel_discovery(&self) {
        self.discovery.cancel();
    }

    /// Pairing session for `device`, or `None` if the latest discovery run
    /// did not report it
    pub fn pairing_session_for(&self, device: &DiscoveredDevice) -> Option<PairingSession> {
        let Some(metadata) = self.discovery.metadata_for(&device.id) else {
            warn!("No discovery metadata for device {}", device.id);
            return None;
        };
        Some(PairingSession::new(
            device.clone(),
            metadata,
            self.strategies.clone(),
            self.backend.clone(),
        ))
    }
}

enum ActiveAttempt {
    Local(Arc<dyn ProvisioningStrategy>),
    Backend(Arc<BackendProvisioner>),
}

/// Onboarding lifecycle for one selected device
pub struct PairingSession {
    device: DiscoveredDevice,
    metadata: DiscoveryMetadata,
    strategies: Vec<Arc<dyn ProvisioningStrategy>>,
    backend: Option<Arc<BackendProvisioner>>,
    active: Mutex<Option<ActiveAttempt>>,
}

impl PairingSession {
    pub fn new(
        device: DiscoveredDevice,
        metadata: DiscoveryMetadata,
        strategies: Vec<Arc<dyn ProvisioningStrategy>>,
        backend: Option<Arc<BackendProvisioner>>,
    ) -> Self {
        Self {
            device,
            metadata,
            strategies,
            backend,
            active: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &DiscoveredDevice {
        &self.device
    }

    /// Strategies able to handle this device, in registration order
    pub fn available_strategies(&self) -> Vec<ProvisioningStrategySummary> {
        self.strategies
            .iter()
            .filter(|s| s.supports(&self.metadata))
            .map(|s| s.summary())
            .collect()
    }

    /// Strategy that `provision` will use.
    ///
    /// Advertised capabilities are tried in preference order; if none of them
    /// has a willing strategy, the first registered strategy that supports the
    /// metadata is used.
    pub fn selected_strategy(&self) -> Option<Arc<dyn ProvisioningStrategy>> {
        for capability in self.device.preferred_capabilities() {
            let candidate = self
                .strategies
                .iter()
                .find(|s| s.capability() == Some(capability) && s.supports(&self.metadata));
            if let Some(strategy) = candidate {
                return Some(Arc::clone(strategy));
            }
        }

        self.strategies
            .iter()
            .find(|s| s.supports(&self.metadata))
            .cloned()
    }

    pub async fn provision(&self, credentials: &WifiCredentials, on_progress: ProgressFn<'_>) -> PairingOutcome {
        let Some(strategy) = self.selected_strategy() else {
            warn!("No provisioning strategy available for {}", self.device.id);
            return PairingOutcome::Failed {
                reason: ProvisioningFailureReason::Unsupported,
                message: format!("No provisioning strategy available for {}", self.device.name),
            };
        };

        info!(
            "Pairing {} using strategy '{}'{}",
            self.device.id,
            strategy.id(),
            if self.backend.is_some() { " via backend" } else { "" }
        );

        let result = match &self.backend {
            Some(backend) => {
                self.set_active(Some(ActiveAttempt::Backend(Arc::clone(backend))));
                backend
                    .provision(&self.device, &self.metadata, credentials, strategy.id(), on_progress)
                    .await
            }
            None => {
                self.set_active(Some(ActiveAttempt::Local(Arc::clone(&strategy))));
                strategy.provision(&self.metadata, credentials, on_progress).await
            }
        };
        self.set_active(None);

        debug!("Pairing {} finished: {:?}", self.device.id, result);
        match result {
            ProvisioningResult::Success(_) => PairingOutcome::Paired(PairedDevice {
                id: self.device.id.clone(),
                name: self.device.name.clone(),
            }),
            ProvisioningResult::Cancelled(message) => PairingOutcome::Failed {
                reason: ProvisioningFailureReason::Cancelled,
                message,
            },
            ProvisioningResult::Failure { reason, message } => PairingOutcome::Failed { reason, message },
        }
    }

    /// Forward cancellation to the running attempt, if any
    pub fn cancel(&self) {
        let active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.as_ref() {
            Some(ActiveAttempt::Local(strategy)) => {
                info!("Cancelling pairing of {} ({})", self.device.id, strategy.id());
                strategy.cancel();
            }
            Some(ActiveAttempt::Backend(backend)) => {
                info!("Cancelling backend pairing of {}", self.device.id);
                backend.cancel();
            }
            None => debug!("No active pairing attempt to cancel"),
        }
    }

    fn set_active(&self, attempt: Option<ActiveAttempt>) {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        *active = attempt;
    }
}
