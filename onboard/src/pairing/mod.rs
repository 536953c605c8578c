//! Pairing of discovered devices

pub mod flow;
pub mod orchestrator;

pub use flow::{OnboardingFlow, OnboardingOutcome, RegistrationTarget};
pub use orchestrator::{ConnectionOrchestrator, PairedDevice, PairingOutcome, PairingSession};
