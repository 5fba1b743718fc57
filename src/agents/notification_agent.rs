//! Notification agent - Fires the one-shot gas price alert
//!
//! Every storage change, in either partition and for any key, re-checks the
//! stored alert. Once the alert tier's price is at or below the threshold the
//! alert is cleared and a notification is sent, so each alert fires at most
//! once.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use super::base::{Agent, AgentError, AgentStatus, Lifecycle};
use crate::model::{Alert, Tier};
use crate::storage::{Storage, Subscription};

/// Title of every alert notification
pub const NOTIFICATION_TITLE: &str = "Ethereum Gas Watcher";

const NOTIFICATION_ICON: &str = "./icons/icon64.png";
const VIBRATE_PATTERN: [u32; 5] = [300, 100, 300, 100, 300];

/// Button shown on a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A user-visible notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    /// Stays on screen until dismissed
    pub require_interaction: bool,
    pub vibrate: Vec<u32>,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// Notification for an alert whose threshold has been met
    pub fn price_reached(level: Tier, price: i64, threshold: i64) -> Self {
        Self {
            title: NOTIFICATION_TITLE.to_string(),
            body: format!(
                "The {} gas price is now {} gwei!\nYou set a notification for {} gwei.",
                level, price, threshold
            ),
            icon: NOTIFICATION_ICON.to_string(),
            badge: NOTIFICATION_ICON.to_string(),
            require_interaction: true,
            vibrate: VIBRATE_PATTERN.to_vec(),
            actions: vec![NotificationAction {
                action: "Close".to_string(),
                title: "Close".to_string(),
            }],
        }
    }
}

/// Callback type for sending notifications
pub type NotifyCallback = Box<dyn Fn(&Notification) + Send + Sync>;

/// Agent that watches the alert and notifies when it is met
pub struct NotificationAgent {
    storage: Arc<Storage>,
    lifecycle: Lifecycle,
    subscription: Mutex<Option<Subscription>>,
    notify_callback: RwLock<Option<NotifyCallback>>,
}

impl NotificationAgent {
    /// Creates the agent, subscribing to storage right away
    pub fn new(storage: Arc<Storage>) -> Self {
        let subscription = storage.subscribe();
        Self {
            storage,
            lifecycle: Lifecycle::new(),
            subscription: Mutex::new(Some(subscription)),
            notify_callback: RwLock::new(None),
        }
    }

    /// Sets the callback for sending notifications
    pub async fn on_notify<F>(&self, callback: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        *self.notify_callback.write().await = Some(Box::new(callback));
    }

    /// Checks the stored alert against the stored prices
    ///
    /// Returns the notification that was sent, if the alert fired.
    pub async fn check_and_notify(&self) -> Result<Option<Notification>, AgentError> {
        let alert = match self.storage.alert().await {
            Some(alert) if alert.is_pending() => alert,
            _ => return Ok(None),
        };
        let Some(level) = alert.level else {
            return Ok(None);
        };
        let Some(current) = self
            .storage
            .gas_data()
            .await
            .and_then(|s| s.price(level))
        else {
            return Ok(None);
        };

        if current > alert.value {
            return Ok(None);
        }

        self.storage.set_alert(&Alert::fired()).await?;

        let notification = Notification::price_reached(level, current, alert.value);
        tracing::info!(
            "Alert met for {}: {} gwei <= {} gwei",
            level,
            current,
            alert.value
        );

        if let Some(ref callback) = *self.notify_callback.read().await {
            callback(&notification);
        }

        Ok(Some(notification))
    }
}

#[async_trait]
impl Agent for NotificationAgent {
    fn id(&self) -> &'static str {
        "notification"
    }

    fn name(&self) -> &'static str {
        "Notification Agent"
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

        let outcome = loop {
            tokio::select! {
                change = subscription.recv() => {
                    if change.is_none() {
                        break AgentStatus::Error("storage closed".into());
                    }
                    if let Err(e) = self.check_and_notify().await {
                        tracing::warn!("Failed to clear alert: {}", e);
                    }
                }
                _ = cancel_token.cancelled() => {
                    tracing::info!("Notification agent cancelled");
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
        self.check_and_notify().await.map(|_| ())
    }
}
