//! Storage module - Shared key-value store with change notification
//!
//! Two partitions (`sync` for gas data and the selected tier, `local` for the
//! alert) observed by the background agents and the panel.

mod base;
mod store;

pub use base::{
    StorageArea, StorageChange, StoreError, ValueChange, ALERT_KEY, GAS_DATA_KEY, LEVEL_KEY,
};
pub use store::{Storage, Subscription};
