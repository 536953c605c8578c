//! Per-device state channels for already paired devices

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Buffered updates per device before slow subscribers start lagging
const CHANNEL_CAPACITY: usize = 16;

/// A state change reported by a paired device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStateUpdate {
    pub device_id: String,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    pub observed_at: DateTime<Utc>,
}

impl DeviceStateUpdate {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            online: None,
            attributes: BTreeMap::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn with_online(mut self, online: bool) -> Self {
        self.online = Some(online);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Receiving end for one device; dropping it unsubscribes
pub type DeviceStateSubscription = broadcast::Receiver<DeviceStateUpdate>;

/// One broadcast channel per device id
#[derive(Default)]
pub struct DeviceStateHub {
    channels: RwLock<HashMap<String, broadcast::Sender<DeviceStateUpdate>>>,
}

impl DeviceStateHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, device_id: &str) -> DeviceStateSubscription {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(device_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver `update` to the subscribers of `device_id`.
    ///
    /// Returns how many subscribers received it; a channel nobody listens to
    /// any more is dropped.
    pub fn publish(&self, device_id: &str, update: DeviceStateUpdate) -> usize {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        let Some(sender) = channels.get(device_id) else {
            debug!("No subscribers for device {}", device_id);
            return 0;
        };

        match sender.send(update) {
            Ok(delivered) => delivered,
            Err(_) => {
                debug!("Pruning idle channel for device {}", device_id);
                channels.remove(device_id);
                0
            }
        }
    }

    pub fn subscriber_count(&self, device_id: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(device_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    /// Devices with an open channel
    pub fn channel_count(&self) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels.len()
    }
}
