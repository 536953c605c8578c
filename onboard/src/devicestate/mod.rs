//! State streams for paired devices

pub mod hub;

pub use hub::{DeviceStateHub, DeviceStateSubscription, DeviceStateUpdate};
