//! Command runners for the onboarding agent

use std::future::Future;

use colored::Colorize;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::app::options::AppOptions;
use crate::app::state::AppState;
use crate::discovery::models::{DiscoveredDevice, DiscoverySessionState};
use crate::errors::OnboardError;
use crate::pairing::flow::{OnboardingOutcome, RegistrationTarget};
use crate::pairing::orchestrator::{ConnectionOrchestrator, PairingOutcome};
use crate::provisioning::models::{ProvisioningProgress, WifiCredentials};
use crate::registration::client::RegistrationResult;

/// What the binary was asked to do
#[derive(Debug, Clone)]
pub enum Command {
    Discover,
    Pair(PairCommand),
}

#[derive(Debug, Clone)]
pub struct PairCommand {
    pub device_id: String,
    pub credentials: WifiCredentials,
    /// Register the device after pairing
    pub target: Option<RegistrationTarget>,
    /// Account login performed before pairing
    pub login: Option<(String, SecretString)>,
}

/// Result of a pairing command
#[derive(Debug)]
pub enum PairingReport {
    Paired(PairingOutcome),
    Onboarded(OnboardingOutcome),
}

/// Run one command until it finishes or `shutdown_signal` fires
pub async fn run(
    options: AppOptions,
    command: Command,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), OnboardError> {
    info!("Initializing onboarding agent...");
    let state = AppState::init(&options).await?;

    match command {
        Command::Discover => {
            let devices = discover_devices(&state.orchestrator, print_state, shutdown_signal).await?;
            print_devices(&devices);
        }
        Command::Pair(pair) => {
            if let Some((email, password)) = &pair.login {
                state.auth.login(email, password).await?;
            }
            let report = pair_device(&state, &pair, shutdown_signal).await?;
            print_report(&report);
        }
    }
    Ok(())
}

/// Drive one discovery run to its terminal state.
///
/// `on_state` sees every state in order. Firing `shutdown` cancels the run.
pub async fn discover_devices<F>(
    orchestrator: &ConnectionOrchestrator,
    on_state: F,
    shutdown: impl Future<Output = ()>,
) -> Result<Vec<DiscoveredDevice>, OnboardError>
where
    F: Fn(&DiscoverySessionState),
{
    let rx = orchestrator.discovery_states();
    tokio::pin!(shutdown);

    tokio::select! {
        outcome = drain_discovery(rx, &on_state) => outcome,
        _ = &mut shutdown => {
            warn!("Shutdown requested, cancelling discovery");
            orchestrator.cancel_discovery();
            Err(OnboardError::Cancelled("Discovery cancelled".to_string()))
        }
    }
}

async fn drain_discovery<F>(
    mut rx: mpsc::Receiver<DiscoverySessionState>,
    on_state: &F,
) -> Result<Vec<DiscoveredDevice>, OnboardError>
where
    F: Fn(&DiscoverySessionState),
{
    while let Some(state) = rx.recv().await {
        on_state(&state);
        match state {
            DiscoverySessionState::Results(devices) => return Ok(devices),
            DiscoverySessionState::NoResults => return Ok(Vec::new()),
            DiscoverySessionState::Error(message) => return Err(OnboardError::DiscoveryError(message)),
            DiscoverySessionState::Idle | DiscoverySessionState::Discovering { .. } => {}
        }
    }
    Err(OnboardError::Internal("Discovery ended without a result".to_string()))
}

/// Discover, select `pair.device_id` and provision it, optionally registering
/// it afterwards. Firing `shutdown` cancels the running attempt.
pub async fn pair_device(
    state: &AppState,
    pair: &PairCommand,
    shutdown: impl Future<Output = ()>,
) -> Result<PairingReport, OnboardError> {
    tokio::pin!(shutdown);

    let devices = discover_devices(&state.orchestrator, |_| {}, &mut shutdown).await?;
    let device = devices
        .into_iter()
        .find(|d| d.id == pair.device_id)
        .ok_or_else(|| OnboardError::NotFound(format!("Device {} was not discovered", pair.device_id)))?;

    let session = state
        .orchestrator
        .pairing_session_for(&device)
        .ok_or_else(|| OnboardError::NotFound(format!("No discovery metadata for {}", device.id)))?;

    if let Some(strategy) = session.selected_strategy() {
        println!(
            "{} {} ({})",
            "Pairing with".bold(),
            device.name,
            strategy.required_user_action()
        );
    }

    let on_progress = print_progress;
    let stop = CancellationToken::new();
    let attempt = async {
        match &pair.target {
            Some(target) => PairingReport::Onboarded(
                state
                    .onboarding
                    .pair_and_register_until(&session, &pair.credentials, target, &on_progress, &stop)
                    .await,
            ),
            None => PairingReport::Paired(session.provision(&pair.credentials, &on_progress).await),
        }
    };
    tokio::pin!(attempt);

    tokio::select! {
        report = &mut attempt => Ok(report),
        _ = &mut shutdown => {
            warn!("Shutdown requested, cancelling pairing of {}", device.id);
            stop.cancel();
            session.cancel();
            Ok(attempt.await)
        }
    }
}

fn print_state(state: &DiscoverySessionState) {
    match state {
        DiscoverySessionState::Discovering { progress } => {
            println!("{} {}%", "Discovering...".cyan(), progress);
        }
        DiscoverySessionState::Error(message) => {
            error!("Discovery failed: {}", message);
        }
        _ => {}
    }
}

fn print_progress(progress: ProvisioningProgress) {
    println!("  {} {}", "->".cyan(), progress.description());
}

fn print_devices(devices: &[DiscoveredDevice]) {
    if devices.is_empty() {
        println!("{}", "No devices found".yellow());
        return;
    }
    println!("{}", format!("Found {} devices:", devices.len()).green().bold());
    for device in devices {
        let capabilities: Vec<_> = device.capabilities.iter().map(|c| c.wire_name()).collect();
        let signal = device
            .signal_strength
            .map(|dbm| format!("{dbm} dBm"))
            .unwrap_or_else(|| "n/a".to_string());
        println!(
            "  {:<10} {:<16} signal={:<8} [{}]",
            device.id,
            device.name,
            signal,
            capabilities.join(", ")
        );
    }
}

fn print_report(report: &PairingReport) {
    match report {
        PairingReport::Paired(PairingOutcome::Paired(device)) => {
            println!("{} {} ({})", "Paired".green().bold(), device.name, device.id);
        }
        PairingReport::Paired(PairingOutcome::Failed { reason, message })
        | PairingReport::Onboarded(OnboardingOutcome::PairingFailed { reason, message }) => {
            println!("{} [{}] {}", "Pairing failed".red().bold(), reason, message);
        }
        PairingReport::Onboarded(OnboardingOutcome::Registered(metadata)) => {
            println!(
                "{} {} in zone {}",
                "Registered".green().bold(),
                metadata.name,
                metadata.zone_id
            );
        }
        PairingReport::Onboarded(OnboardingOutcome::Cancelled) => {
            println!("{}", "Onboarding cancelled".yellow().bold());
        }
        PairingReport::Onboarded(OnboardingOutcome::RegistrationFailed(result)) => match result {
            RegistrationResult::Conflict(reason) => println!(
                "{} {}",
                "Already registered:".yellow().bold(),
                reason.as_deref().unwrap_or("conflict")
            ),
            RegistrationResult::TransientFailure(e) => {
                println!("{} {} (try again later)", "Registration failed:".red().bold(), e)
            }
            RegistrationResult::UnexpectedFailure(e) => {
                println!("{} {}", "Registration failed:".red().bold(), e)
            }
            RegistrationResult::Success(_) => {}
        },
    }
}
