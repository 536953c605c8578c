//! Device discovery

pub mod fixture;
pub mod lan;
pub mod models;
pub mod session;
pub mod strategy;

pub use models::{DiscoveredDevice, DiscoveryFinding, DiscoveryMetadata, DiscoverySessionState, PairingCapability};
pub use session::DiscoverySession;
pub use strategy::DiscoveryStrategy;
