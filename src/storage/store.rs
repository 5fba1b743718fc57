//! Two-partition key-value store with change notification
//!
//! Writes are applied (and persisted, when a directory is configured) before
//! the matching `StorageChange` is broadcast, so any subscriber reading the
//! store after receiving an event observes the new value.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};

use super::base::{
    StorageArea, StorageChange, StoreError, ValueChange, ALERT_KEY, GAS_DATA_KEY, LEVEL_KEY,
};
use crate::model::{Alert, GasSnapshot, Tier};

/// Buffered change events per subscriber before it starts lagging
const CHANGE_CAPACITY: usize = 64;

/// Shared storage used by the agents and the panel
pub struct Storage {
    sync: RwLock<Map<String, Value>>,
    local: RwLock<Map<String, Value>>,
    changes: broadcast::Sender<StorageChange>,
    persist_dir: Option<PathBuf>,
}

impl Storage {
    /// Creates an empty, memory-only store
    pub fn in_memory() -> Self {
        Self::with_partitions(Map::new(), Map::new(), None)
    }

    /// Opens a store persisted as one JSON file per partition in `dir`
    ///
    /// Missing files start empty. Unreadable files are logged and ignored.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;

        let sync = Self::load_partition(&dir, StorageArea::Sync).await;
        let local = Self::load_partition(&dir, StorageArea::Local).await;

        tracing::info!("Opened storage at {}", dir.display());
        Ok(Self::with_partitions(sync, local, Some(dir)))
    }

    fn with_partitions(
        sync: Map<String, Value>,
        local: Map<String, Value>,
        persist_dir: Option<PathBuf>,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            sync: RwLock::new(sync),
            local: RwLock::new(local),
            changes,
            persist_dir,
        }
    }

    async fn load_partition(dir: &Path, area: StorageArea) -> Map<String, Value> {
        let path = dir.join(area.file_name());
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(_) => return Map::new(),
        };

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!("Ignoring unreadable {} storage file: {}", area, e);
                Map::new()
            }
        }
    }

    fn partition(&self, area: StorageArea) -> &RwLock<Map<String, Value>> {
        match area {
            StorageArea::Sync => &self.sync,
            StorageArea::Local => &self.local,
        }
    }

    /// Subscribes to change events for both partitions
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.changes.subscribe(),
        }
    }

    /// Reads a raw value
    pub async fn get(&self, area: StorageArea, key: &str) -> Option<Value> {
        self.partition(area).read().await.get(key).cloned()
    }

    /// Reads a value and converts it, returning `None` when absent or malformed
    pub async fn get_as<T: DeserializeOwned>(&self, area: StorageArea, key: &str) -> Option<T> {
        let value = self.get(area, key).await?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("Stored {}.{} has unexpected shape: {}", area, key, e);
                None
            }
        }
    }

    /// Writes several keys to one partition as a single operation
    ///
    /// Keys whose value is unchanged are not reported. If nothing changed no
    /// event is broadcast. When persisting fails the partition is left as it
    /// was.
    pub async fn set<I>(&self, area: StorageArea, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut changes = BTreeMap::new();
        let mut partition = self.partition(area).write().await;
        let mut updated = partition.clone();

        for (key, value) in entries {
            let old_value = updated.insert(key.clone(), value.clone());
            if old_value.as_ref() == Some(&value) {
                continue;
            }
            changes.insert(
                key,
                ValueChange {
                    old_value,
                    new_value: Some(value),
                },
            );
        }

        if changes.is_empty() {
            return Ok(());
        }

        if let Some(dir) = &self.persist_dir {
            let content = serde_json::to_string_pretty(&updated)?;
            tokio::fs::write(dir.join(area.file_name()), content).await?;
        }

        *partition = updated;

        // Still under the write lock, so events keep write order
        let _ = self.changes.send(StorageChange { area, changes });
        Ok(())
    }

    /// Serializes and writes a single key
    pub async fn set_as<T: Serialize>(
        &self,
        area: StorageArea,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let value = serde_json::to_value(value)?;
        self.set(area, [(key.to_string(), value)]).await
    }

    /// Latest gas snapshot, if one has been stored
    pub async fn gas_data(&self) -> Option<GasSnapshot> {
        self.get_as(StorageArea::Sync, GAS_DATA_KEY).await
    }

    /// Replaces the stored gas snapshot
    pub async fn set_gas_data(&self, snapshot: &GasSnapshot) -> Result<(), StoreError> {
        self.set_as(StorageArea::Sync, GAS_DATA_KEY, snapshot).await
    }

    /// Selected tier, `standard` until the user picks one
    pub async fn level(&self) -> Tier {
        self.get_as(StorageArea::Sync, LEVEL_KEY)
            .await
            .unwrap_or_default()
    }

    /// Persists the selected tier
    pub async fn set_level(&self, level: Tier) -> Result<(), StoreError> {
        self.set_as(StorageArea::Sync, LEVEL_KEY, &level).await
    }

    /// Current alert, if any has been written
    pub async fn alert(&self) -> Option<Alert> {
        self.get_as(StorageArea::Local, ALERT_KEY).await
    }

    /// Replaces the alert
    pub async fn set_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.set_as(StorageArea::Local, ALERT_KEY, alert).await
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::in_memory()
    }
}

/// Handle receiving storage change events
///
/// Dropping the handle (or calling [`Subscription::unsubscribe`]) stops
/// delivery.
pub struct Subscription {
    receiver: broadcast::Receiver<StorageChange>,
}

impl Subscription {
    /// Waits for the next change; `None` once the store is gone
    pub async fn recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Storage subscriber lagged, skipped {} changes", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns a change that is already queued, without waiting
    pub fn try_recv(&mut self) -> Option<StorageChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }

    /// Stops receiving changes
    pub fn unsubscribe(self) {}
}
