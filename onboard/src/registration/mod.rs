//! Backend registration of provisioned devices

pub mod cache;
pub mod client;

pub use cache::{DeviceCache, DeviceMetadata, InMemoryDeviceCache};
pub use client::{DeviceRegistrationClient, DeviceRegistrationRequest, RegistrationResult};
