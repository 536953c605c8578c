//! Local cache of registered devices

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::OnboardError;

/// System-of-record entry for a registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    pub device_id: String,
    pub name: String,
    pub location_id: String,
    pub zone_id: String,
    #[serde(default)]
    pub owner_id: Option<String>,
    pub registered_at: DateTime<Utc>,
}

/// Local store that takes over a device once it is registered
#[async_trait]
pub trait DeviceCache: Send + Sync {
    async fn save_device(&self, metadata: &DeviceMetadata) -> Result<(), OnboardError>;

    /// Reload the device list and return it
    async fn refresh_devices(&self) -> Result<Vec<DeviceMetadata>, OnboardError>;
}

/// In-memory device cache
#[derive(Default)]
pub struct InMemoryDeviceCache {
    entries: RwLock<HashMap<String, DeviceMetadata>>,
    listing: RwLock<Vec<DeviceMetadata>>,
    refreshes: AtomicU64,
}

impl InMemoryDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a device from cache
    pub fn get(&self, device_id: &str) -> Option<DeviceMetadata> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(device_id).cloned()
    }

    /// Device list as of the last refresh
    pub fn devices(&self) -> Vec<DeviceMetadata> {
        let listing = self.listing.read().unwrap_or_else(|e| e.into_inner());
        listing.clone()
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceCache for InMemoryDeviceCache {
    async fn save_device(&self, metadata: &DeviceMetadata) -> Result<(), OnboardError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(metadata.device_id.clone(), metadata.clone());
        Ok(())
    }

    async fn refresh_devices(&self) -> Result<Vec<DeviceMetadata>, OnboardError> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let mut devices: Vec<DeviceMetadata> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.values().cloned().collect()
        };
        devices.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.device_id.cmp(&b.device_id)));

        let mut listing = self.listing.write().unwrap_or_else(|e| e.into_inner());
        *listing = devices.clone();
        Ok(devices)
    }
}
