//! Storage partitions, change events and errors

use std::collections::BTreeMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Key holding the latest `GasSnapshot` (sync partition)
pub const GAS_DATA_KEY: &str = "gasData";
/// Key holding the selected tier (sync partition)
pub const LEVEL_KEY: &str = "level";
/// Key holding the pending alert (local partition)
pub const ALERT_KEY: &str = "alert";

/// Errors that can occur while writing storage
#[derive(Debug, Error)]
pub enum StoreError {
    /// Partition file could not be read or written
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be converted to or from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Storage partition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageArea {
    /// Shared across the user's processes
    Sync,
    /// Confined to this device
    Local,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Sync => "sync",
            StorageArea::Local => "local",
        }
    }

    /// File name used when the partition is persisted
    pub fn file_name(&self) -> &'static str {
        match self {
            StorageArea::Sync => "sync.json",
            StorageArea::Local => "local.json",
        }
    }
}

impl fmt::Display for StorageArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of a single changed key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
}

/// A batch of key changes applied to one partition by a single write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageChange {
    pub area: StorageArea,
    pub changes: BTreeMap<String, ValueChange>,
}

impl StorageChange {
    /// Returns true if `key` changed in this batch
    pub fn contains(&self, key: &str) -> bool {
        self.changes.contains_key(key)
    }

    /// Returns true if `key` changed in the given partition
    pub fn touches(&self, area: StorageArea, key: &str) -> bool {
        self.area == area && self.contains(key)
    }

    /// The raw new value of `key`
    pub fn new_value(&self, key: &str) -> Option<&Value> {
        self.changes.get(key)?.new_value.as_ref()
    }

    /// The new value of `key`, if present and of the expected shape
    pub fn new_value_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.new_value(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Tier;
    use serde_json::json;

    fn level_change(new: Value) -> StorageChange {
        let mut changes = BTreeMap::new();
        changes.insert(
            LEVEL_KEY.to_string(),
            ValueChange {
                old_value: None,
                new_value: Some(new),
            },
        );
        StorageChange {
            area: StorageArea::Sync,
            changes,
        }
    }

    #[test]
    fn test_touches_checks_area_and_key() {
        let change = level_change(json!("fast"));
        assert!(change.touches(StorageArea::Sync, LEVEL_KEY));
        assert!(!change.touches(StorageArea::Local, LEVEL_KEY));
        assert!(!change.touches(StorageArea::Sync, GAS_DATA_KEY));
    }

    #[test]
    fn test_new_value_as_typed() {
        let change = level_change(json!("fast"));
        assert_eq!(change.new_value_as::<Tier>(LEVEL_KEY), Some(Tier::Fast));
    }

    #[test]
    fn test_new_value_as_wrong_shape_is_none() {
        let change = level_change(json!(42));
        assert_eq!(change.new_value_as::<Tier>(LEVEL_KEY), None);
    }

    #[test]
    fn test_change_serializes_camel_case() {
        let change = level_change(json!("slow"));
        let json = serde_json::to_value(&change).unwrap();
        assert_eq!(
            json,
            json!({ "area": "sync", "changes": { "level": { "newValue": "slow" } } })
        );
    }
}
