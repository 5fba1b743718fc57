//! Badge agent - Shows the selected tier's price on the toolbar badge
//!
//! Reacts to sync-partition changes of `gasData` or `level`. A price that is
//! missing or not positive leaves the badge as it was.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::base::{Agent, AgentError, AgentStatus, Lifecycle};
use crate::model::{GasSnapshot, Tier};
use crate::storage::{Storage, StorageArea, StorageChange, Subscription, GAS_DATA_KEY, LEVEL_KEY};

/// Badge contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub level: Tier,
    pub text: String,
    pub color: &'static str,
}

impl Badge {
    /// Badge for a tier's price
    pub fn new(level: Tier, price: i64) -> Self {
        Self {
            level,
            text: price.to_string(),
            color: level.color(),
        }
    }
}

/// Callback type for rendering the badge
pub type BadgeCallback = Box<dyn Fn(&Badge) + Send + Sync>;

/// Agent that keeps the badge in step with storage
pub struct BadgeAgent {
    storage: Arc<Storage>,
    lifecycle: Lifecycle,
    subscription: Mutex<Option<Subscription>>,
    current: RwLock<Option<Badge>>,
    on_badge: RwLock<Option<BadgeCallback>>,
}

impl BadgeAgent {
    /// Creates the agent, subscribing to storage right away so no change
    /// written before `start` is missed
    pub fn new(storage: Arc<Storage>) -> Self {
        let subscription = storage.subscribe();
        Self {
            storage,
            lifecycle: Lifecycle::new(),
            subscription: Mutex::new(Some(subscription)),
            current: RwLock::new(None),
            on_badge: RwLock::new(None),
        }
    }

    /// Sets the callback that renders the badge
    pub async fn on_badge<F>(&self, callback: F)
    where
        F: Fn(&Badge) + Send + Sync + 'static,
    {
        *self.on_badge.write().await = Some(Box::new(callback));
    }

    /// The badge last rendered, if any
    pub async fn current(&self) -> Option<Badge> {
        self.current.read().await.clone()
    }

    /// Updates the badge for a storage change, returning the new badge
    pub async fn handle_change(&self, change: &StorageChange) -> Option<Badge> {
        if change.area != StorageArea::Sync {
            return None;
        }

        let (level, price) = if change.contains(GAS_DATA_KEY) {
            let level = self.storage.level().await;
            let price = change
                .new_value_as::<GasSnapshot>(GAS_DATA_KEY)
                .and_then(|s| s.badge_price(level));
            (level, price)
        } else if change.contains(LEVEL_KEY) {
            let level = change.new_value_as::<Tier>(LEVEL_KEY)?;
            let price = self
                .storage
                .gas_data()
                .await
                .and_then(|s| s.badge_price(level));
            (level, price)
        } else {
            return None;
        };

        let badge = Badge::new(level, price?);
        self.update_badge(badge.clone()).await;
        Some(badge)
    }

    /// Renders the badge from what is already stored
    pub async fn render_stored(&self) -> Option<Badge> {
        let level = self.storage.level().await;
        let price = self.storage.gas_data().await?.badge_price(level)?;

        let badge = Badge::new(level, price);
        self.update_badge(badge.clone()).await;
        Some(badge)
    }

    async fn update_badge(&self, badge: Badge) {
        tracing::debug!("Badge {} ({}) for {}", badge.text, badge.color, badge.level);

        if let Some(ref callback) = *self.on_badge.read().await {
            callback(&badge);
        }
        *self.current.write().await = Some(badge);
    }
}

#[async_trait]
impl Agent for BadgeAgent {
    fn id(&self) -> &'static str {
        "badge"
    }

    fn name(&self) -> &'static str {
        "Badge Agent"
    }

    fn status(&self) -> AgentStatus {
        self.lifecycle.status()
    }

    async fn start(&self) -> Result<(), AgentError> {
        let cancel_token = self.lifecycle.begin().await?;
        let mut subscription = match self.subscription.lock().await.take() {
            Some(subscription) => subscription,
            None => self.storage.subscribe(),
        };

        self.render_stored().await;

        let outcome = loop {
            tokio::select! {
                change = subscription.recv() => match change {
                    Some(change) => {
                        self.handle_change(&change).await;
                    }
                    None => break AgentStatus::Error("storage closed".into()),
                },
                _ = cancel_token.cancelled() => {
                    tracing::info!("Badge agent cancelled");
                    break AgentStatus::Stopped;
                }
            }
        };

        self.lifecycle.finish(outcome).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.lifecycle.stop().await;
        Ok(())
    }

    async fn trigger(&self) -> Result<(), AgentError> {
        self.render_stored().await;
        Ok(())
    }
}
