//! Refresh agent - Keeps the stored gas snapshot fresh
//!
//! Fetches prices once at start, then on a recurring `fetch_gasData` alarm,
//! and whenever a `RefreshRequest` arrives from the panel. Each successful
//! fetch replaces `gasData` in the sync partition. Overlapping refreshes are
//! not serialized; the last response to resolve wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::{Instant, MissedTickBehavior};

use super::base::{Agent, AgentError, AgentStatus, Lifecycle};
use crate::model::GasSnapshot;
use crate::source::PriceSource;
use crate::storage::Storage;

/// Name of the recurring refresh alarm
pub const REFRESH_ALARM: &str = "fetch_gasData";

/// Callback type for when a new snapshot has been stored
pub type SnapshotCallback = Box<dyn Fn(&GasSnapshot) + Send + Sync>;

/// Configuration for the refresh agent
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Time before the first alarm
    pub delay: Duration,
    /// Time between alarms
    pub period: Duration,
    /// Whether to fetch immediately on start
    pub fetch_on_start: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self::with_interval_minutes(1)
    }
}

impl RefreshConfig {
    /// Uses `minutes` as both the alarm delay and period
    pub fn with_interval_minutes(minutes: u64) -> Self {
        Self::with_interval_seconds(minutes * 60)
    }

    /// Uses `seconds` as both the alarm delay and period (for testing)
    pub fn with_interval_seconds(seconds: u64) -> Self {
        Self {
            delay: Duration::from_secs(seconds),
            period: Duration::from_secs(seconds),
            fetch_on_start: true,
        }
    }
}

/// Message the panel sends to ask for fresh data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum RefreshRequest {
    #[serde(rename = "fetch_gasData")]
    FetchGasData,
}

/// Requests waiting behind an in-flight fetch; further ones coalesce
const PENDING_REQUESTS: usize = 1;

/// Fire-and-forget sender of refresh requests
#[derive(Debug, Clone)]
pub struct RefreshRequester {
    sender: mpsc::Sender<RefreshRequest>,
}

impl RefreshRequester {
    /// Creates a requester and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::Receiver<RefreshRequest>) {
        Self::channel_with_capacity(PENDING_REQUESTS)
    }

    /// Like `channel`, holding up to `capacity` undelivered requests
    pub fn channel_with_capacity(capacity: usize) -> (Self, mpsc::Receiver<RefreshRequest>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Sends a request without waiting for it to be handled
    ///
    /// A request that finds one already pending is merged into it.
    pub fn send(&self, request: RefreshRequest) -> Result<(), AgentError> {
        match self.sender.try_send(request) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(AgentError::NotRunning),
        }
    }

    /// Asks the refresh agent to fetch gas data now
    pub fn fetch_gas_data(&self) -> Result<(), AgentError> {
        self.send(RefreshRequest::FetchGasData)
    }
}

/// Agent that fetches gas prices and writes them to storage
pub struct RefreshAgent {
    config: RefreshConfig,
    source: Arc<dyn PriceSource>,
    storage: Arc<Storage>,
    lifecycle: Lifecycle,
    requester: RefreshRequester,
    requests: Mutex<mpsc::Receiver<RefreshRequest>>,
    on_update: RwLock<Option<SnapshotCallback>>,
}

impl RefreshAgent {
    /// Creates a refresh agent with the default one minute alarm
    pub fn new(source: Arc<dyn PriceSource>, storage: Arc<Storage>) -> Self {
        Self::with_config(RefreshConfig::default(), source, storage)
    }

    /// Creates a refresh agent with custom configuration
    pub fn with_config(
        config: RefreshConfig,
        source: Arc<dyn PriceSource>,
        storage: Arc<Storage>,
    ) -> Self {
        let (requester, requests) = RefreshRequester::channel();
        Self {
            config,
            source,
            storage,
            lifecycle: Lifecycle::new(),
            requester,
            requests: Mutex::new(requests),
            on_update: RwLock::new(None),
        }
    }

    /// Returns a handle other components use to request a refresh
    pub fn requester(&self) -> RefreshRequester {
        self.requester.clone()
    }

    /// Sets a callback to be called after each stored snapshot
    pub async fn on_update<F>(&self, callback: F)
    where
        F: Fn(&GasSnapshot) + Send + Sync + 'static,
    {
        *self.on_update.write().await = Some(Box::new(callback));
    }

    /// Fetches prices once and stores them
    ///
    /// Failures are logged and leave the stored snapshot untouched.
    pub async fn fetch_gas_data(&self) -> Option<GasSnapshot> {
        let snapshot = match self.source.fetch().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Failed to fetch gas data from {}: {}", self.source.id(), e);
                return None;
            }
        };

        tracing::debug!("Fetched gas data from {}: {:?}", self.source.id(), snapshot);

        if let Err(e) = self.storage.set_gas_data(&snapshot).await {
            tracing::warn!("Failed to store gas data: {}", e);
            return None;
        }

        if let Some(ref callback) = *self.on_update.read().await {
            callback(&snapshot);
        }

        Some(snapshot)
    }
}

#[async_trait]
impl Agent for RefreshAgent {
    fn id(&self) -> &'static str {
        "refresh"
    }

    fn name(&self) -> &'static str {
        "Refresh Agent"
    }

    fn status(&self) -> AgentStatus {
        self.lifecycle.status()
    }

    async fn start(&self) -> Result<(), AgentError> {
        let cancel_token = self.lifecycle.begin().await?;
        let mut requests = self.requests.lock().await;

        if self.config.fetch_on_start {
            self.fetch_gas_data().await;
        }

        let mut alarm =
            tokio::time::interval_at(Instant::now() + self.config.delay, self.config.period);
        alarm.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = alarm.tick() => {
                    tracing::debug!("Alarm {} fired", REFRESH_ALARM);
                    self.fetch_gas_data().await;
                }
                Some(request) = requests.recv() => match request {
                    RefreshRequest::FetchGasData => {
                        tracing::debug!("Refresh requested");
                        self.fetch_gas_data().await;
                    }
                },
                _ = cancel_token.cancelled() => {
                    tracing::info!("Refresh agent cancelled");
                    break;
                }
            }
        }

        self.lifecycle.finish(AgentStatus::Stopped).await;
        Ok(())
    }

    async fn stop(&self) -> Result<(), AgentError> {
        self.lifecycle.stop().await;
        Ok(())
    }

    async fn trigger(&self) -> Result<(), AgentError> {
        self.fetch_gas_data().await;
        Ok(())
    }
}
