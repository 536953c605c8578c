//! Opaque key-value secret store

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;

use crate::errors::OnboardError;
use crate::filesys::file::File;

/// Secret store trait for testability
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read a secret
    async fn get(&self, key: &str) -> Result<Option<SecretString>, OnboardError>;

    /// Write or replace a secret
    async fn put(&self, key: &str, value: SecretString) -> Result<(), OnboardError>;

    /// Remove a secret, missing keys are ignored
    async fn remove(&self, key: &str) -> Result<(), OnboardError>;
}

/// Process-local secret store
#[derive(Default)]
pub struct InMemorySecretStore {
    entries: RwLock<BTreeMap<String, SecretString>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>, OnboardError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: SecretString) -> Result<(), OnboardError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), OnboardError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Secret store persisted as a JSON map readable only by the owner
pub struct FileSecretStore {
    file: File,
    // serializes read-modify-write cycles
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn new(file: File) -> Self {
        Self {
            file,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, OnboardError> {
        if !self.file.exists().await {
            return Ok(BTreeMap::new());
        }
        self.file.read_json().await.map_err(|e| {
            OnboardError::StorageError(format!(
                "Failed to read secrets file {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }

    async fn store(&self, entries: &BTreeMap<String, String>) -> Result<(), OnboardError> {
        self.file.write_json(entries).await?;
        self.file.set_permissions_600().await
    }
}

#[async_trait]
impl SecretStore for FileSecretStore {
    async fn get(&self, key: &str) -> Result<Option<SecretString>, OnboardError> {
        let _guard = self.lock.lock().await;
        let entries = self.load().await?;
        Ok(entries.get(key).map(|v| SecretString::from(v.clone())))
    }

    async fn put(&self, key: &str, value: SecretString) -> Result<(), OnboardError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.expose_secret().to_string());
        self.store(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), OnboardError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.store(&entries).await?;
        }
        Ok(())
    }
}
