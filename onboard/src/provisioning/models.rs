//! Provisioning models

use std::fmt;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Home network credentials supplied for one provisioning attempt
#[derive(Debug, Clone)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: SecretString,
}

impl WifiCredentials {
    pub fn new(ssid: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            ssid: ssid.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Handshake phases, in the order they are entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningProgress {
    ConnectingToDeviceAp,
    SendingCredentials,
    WaitingForDevice,
}

impl ProvisioningProgress {
    pub fn description(&self) -> &'static str {
        match self {
            ProvisioningProgress::ConnectingToDeviceAp => "Connecting to device access point",
            ProvisioningProgress::SendingCredentials => "Sending home Wi-Fi credentials",
            ProvisioningProgress::WaitingForDevice => "Waiting for device to join network",
        }
    }
}

impl fmt::Display for ProvisioningProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Closed set of reasons a provisioning attempt can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProvisioningFailureReason {
    ApUnreachable,
    BadPassword,
    DeviceTimeout,
    Cancelled,
    Unsupported,
    Unknown,
}

impl fmt::Display for ProvisioningFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProvisioningFailureReason::ApUnreachable => "AP_UNREACHABLE",
            ProvisioningFailureReason::BadPassword => "BAD_PASSWORD",
            ProvisioningFailureReason::DeviceTimeout => "DEVICE_TIMEOUT",
            ProvisioningFailureReason::Cancelled => "CANCELLED",
            ProvisioningFailureReason::Unsupported => "UNSUPPORTED",
            ProvisioningFailureReason::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Terminal outcome of one provisioning attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningResult {
    Success(String),
    Failure {
        reason: ProvisioningFailureReason,
        message: String,
    },
    Cancelled(String),
}

impl ProvisioningResult {
    pub fn failure(reason: ProvisioningFailureReason, message: impl Into<String>) -> Self {
        ProvisioningResult::Failure {
            reason,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        ProvisioningResult::Cancelled("Provisioning cancelled".to_string())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProvisioningResult::Success(_))
    }

    pub fn message(&self) -> &str {
        match self {
            ProvisioningResult::Success(message)
            | ProvisioningResult::Failure { message, .. }
            | ProvisioningResult::Cancelled(message) => message,
        }
    }
}

/// Consumer-facing description of a provisioning strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningStrategySummary {
    pub id: String,
    pub name: String,
    pub required_user_action: String,
}
