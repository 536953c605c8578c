//! Concurrent discovery fan-out and aggregation

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::discovery::models::{DiscoveredDevice, DiscoveryFinding, DiscoveryMetadata, DiscoverySessionState};
use crate::discovery::strategy::DiscoveryStrategy;
use crate::errors::OnboardError;
use crate::utils::{new_uuid, percent_complete};

/// Capacity of the state channel handed to consumers
const STATE_CHANNEL_CAPACITY: usize = 32;

/// Runs every configured strategy concurrently and merges their sightings.
///
/// Consumers only see [`DiscoverySessionState`]; the metadata needed to
/// provision a chosen device stays on the session and is looked up by id.
///
/// Starting a run while another is in flight cancels the older one. Only the
/// newest run records metadata.
pub struct DiscoverySession {
    strategies: Vec<Arc<dyn DiscoveryStrategy>>,
    metadata_by_device: RwLock<HashMap<String, DiscoveryMetadata>>,
    active_run: Mutex<Option<ActiveRun>>,
}

struct ActiveRun {
    id: String,
    cancel: CancellationToken,
}

impl DiscoverySession {
    pub fn new(strategies: Vec<Arc<dyn DiscoveryStrategy>>) -> Self {
        Self {
            strategies,
            metadata_by_device: RwLock::new(HashMap::new()),
            active_run: Mutex::new(None),
        }
    }

    /// Number of configured strategies
    pub fn strategy_count(&self) -> usize {
        self.strategies.len()
    }

    /// Metadata recorded for `device_id` by the latest run
    pub fn metadata_for(&self, device_id: &str) -> Option<DiscoveryMetadata> {
        let metadata = self.metadata_by_device.read().unwrap_or_else(|e| e.into_inner());
        metadata.get(device_id).cloned()
    }

    /// Start a run on a background task and stream its states
    pub fn discover(self: &Arc<Self>) -> mpsc::Receiver<DiscoverySessionState> {
        let (tx, rx) = mpsc::channel(STATE_CHANNEL_CAPACITY);
        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run(tx).await;
        });
        rx
    }

    /// Ask the strategies of the current run to stop
    pub fn cancel(&self) {
        let active = self.active_run.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(run) = active.as_ref() {
            info!("Cancelling discovery run {}", run.id);
            run.cancel.cancel();
        }
    }

    /// Drive one run to completion, sending every state to `tx`.
    ///
    /// Stops early if the receiver is dropped.
    pub async fn run(&self, tx: mpsc::Sender<DiscoverySessionState>) {
        let run_id = new_uuid();
        let cancel = CancellationToken::new();
        self.begin_run(&run_id, cancel.clone());

        if self.strategies.is_empty() {
            info!("No discovery strategies configured");
            self.end_run(&run_id);
            let _ = tx.send(DiscoverySessionState::NoResults).await;
            return;
        }

        if tx
            .send(DiscoverySessionState::Discovering { progress: 0 })
            .await
            .is_err()
        {
            self.end_run(&run_id);
            return;
        }

        let total = self.strategies.len();
        info!("Starting discovery run {} with {} strategies", run_id, total);

        let mut tasks = JoinSet::new();
        for strategy in &self.strategies {
            let strategy = Arc::clone(strategy);
            let token = cancel.child_token();
            tasks.spawn(async move {
                let id = strategy.id().to_string();
                let result = strategy.discover(token).await;
                (id, result)
            });
        }

        let mut completed = 0;
        let mut aggregated: Vec<DiscoveredDevice> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        while let Some(joined) = tasks.join_next().await {
            let (strategy_id, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => (
                    "unknown".to_string(),
                    Err(OnboardError::DiscoveryError(format!(
                        "Discovery strategy task failed: {}",
                        e
                    ))),
                ),
            };

            let findings = match result {
                Ok(findings) => findings,
                Err(e) => {
                    error!("Discovery strategy {} failed: {}", strategy_id, e);
                    // siblings observe the token and wind down on their own
                    cancel.cancel();
                    tasks.detach_all();
                    self.end_run(&run_id);
                    let _ = tx.send(DiscoverySessionState::Error(error_message(e))).await;
                    return;
                }
            };

            debug!(
                "Discovery strategy {} reported {} sightings",
                strategy_id,
                findings.len()
            );
            self.merge(&run_id, findings, &mut aggregated, &mut seen);

            completed += 1;
            let progress = percent_complete(completed, total);
            if tx
                .send(DiscoverySessionState::Discovering { progress })
                .await
                .is_err()
            {
                debug!("Discovery consumer went away, stopping run");
                cancel.cancel();
                tasks.detach_all();
                self.end_run(&run_id);
                return;
            }
        }

        self.end_run(&run_id);
        info!("Discovery run {} complete: {} devices found", run_id, aggregated.len());

        let terminal = if aggregated.is_empty() {
            DiscoverySessionState::NoResults
        } else {
            DiscoverySessionState::Results(aggregated)
        };
        let _ = tx.send(terminal).await;
    }

    /// First sighting of an id wins; later duplicates are dropped entirely
    fn merge(
        &self,
        run_id: &str,
        findings: Vec<DiscoveryFinding>,
        aggregated: &mut Vec<DiscoveredDevice>,
        seen: &mut HashSet<String>,
    ) {
        // lock order: active_run, then metadata
        let active = self.active_run.lock().unwrap_or_else(|e| e.into_inner());
        let current = active.as_ref().is_some_and(|run| run.id == run_id);
        let mut metadata = self.metadata_by_device.write().unwrap_or_else(|e| e.into_inner());
        for finding in findings {
            if !seen.insert(finding.device.id.clone()) {
                debug!("Ignoring duplicate sighting of {}", finding.device.id);
                continue;
            }
            if current {
                metadata.insert(finding.device.id.clone(), finding.metadata);
            }
            aggregated.push(finding.device);
        }
    }

    /// Make `run_id` the active run, cancelling any run still in flight
    fn begin_run(&self, run_id: &str, cancel: CancellationToken) {
        let mut active = self.active_run.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = active.take() {
            warn!("Discovery run {} superseded by {}", previous.id, run_id);
            previous.cancel.cancel();
        }
        *active = Some(ActiveRun {
            id: run_id.to_string(),
            cancel,
        });

        let mut metadata = self.metadata_by_device.write().unwrap_or_else(|e| e.into_inner());
        metadata.clear();
    }

    /// Clear the active run if it is still `run_id`
    fn end_run(&self, run_id: &str) {
        let mut active = self.active_run.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(|run| run.id == run_id) {
            *active = None;
        }
    }
}

fn error_message(err: OnboardError) -> String {
    match err {
        OnboardError::DiscoveryError(message) => message,
        other => other.to_string(),
    }
}

/// Drain a state stream until its terminal state
pub async fn collect_states(
    mut rx: mpsc::Receiver<DiscoverySessionState>,
) -> Vec<DiscoverySessionState> {
    let mut states = Vec::new();
    while let Some(state) = rx.recv().await {
        let terminal = state.is_terminal();
        states.push(state);
        if terminal {
            break;
        }
    }
    states
}
