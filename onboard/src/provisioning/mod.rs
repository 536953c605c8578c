//! Credential delivery to discovered devices

pub mod backend;
pub mod bluetooth;
pub mod models;
pub mod onboarding_code;
pub mod softap;
pub mod strategy;

pub use models::{
    ProvisioningFailureReason, ProvisioningProgress, ProvisioningResult, ProvisioningStrategySummary,
    WifiCredentials,
};
pub use strategy::{ProgressFn, ProvisioningStrategy};
