//! Base agent trait and types
//!
//! Every background task of the watcher (refresh, badge, notification) is an
//! `Agent` driven by the `AgentManager`.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::storage::StoreError;

/// Errors that can occur in agents
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent is already running
    #[error("Agent is already running")]
    AlreadyRunning,

    /// Agent is not running, or its request channel is closed
    #[error("Agent is not running")]
    NotRunning,

    /// Agent operation failed
    #[error("Agent operation failed: {0}")]
    OperationFailed(String),

    /// Storage write failed
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

/// Status of an agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentStatus {
    /// Agent is idle and not running
    Idle,
    /// Agent is currently running
    Running,
    /// Agent encountered an error
    Error(String),
    /// Agent has been stopped
    Stopped,
}

impl AgentStatus {
    /// Returns true if the agent is running
    pub fn is_running(&self) -> bool {
        matches!(self, AgentStatus::Running)
    }

    /// Returns true if the agent is idle or stopped
    pub fn is_stopped(&self) -> bool {
        matches!(self, AgentStatus::Idle | AgentStatus::Stopped)
    }

    /// Returns true if the agent has an error
    pub fn has_error(&self) -> bool {
        matches!(self, AgentStatus::Error(_))
    }
}

/// Status and cancellation shared by the agent implementations
///
/// A fresh cancellation token is issued on every `begin`, so a stopped agent
/// can be started again.
pub(crate) struct Lifecycle {
    status: RwLock<AgentStatus>,
    cancel_token: RwLock<CancellationToken>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            status: RwLock::new(AgentStatus::Idle),
            cancel_token: RwLock::new(CancellationToken::new()),
        }
    }

    pub(crate) fn status(&self) -> AgentStatus {
        // try_read keeps `Agent::status` synchronous
        self.status
            .try_read()
            .map(|s| s.clone())
            .unwrap_or(AgentStatus::Idle)
    }

    /// Marks the agent running and returns the token its loop must watch
    pub(crate) async fn begin(&self) -> Result<CancellationToken, AgentError> {
        let mut status = self.status.write().await;
        if status.is_running() {
            return Err(AgentError::AlreadyRunning);
        }

        let token = CancellationToken::new();
        *self.cancel_token.write().await = token.clone();
        *status = AgentStatus::Running;
        Ok(token)
    }

    /// Records how the loop ended, unless `stop` already did
    pub(crate) async fn finish(&self, outcome: AgentStatus) {
        let mut status = self.status.write().await;
        if status.is_running() {
            *status = outcome;
        }
    }

    pub(crate) async fn stop(&self) {
        let mut status = self.status.write().await;
        if !status.is_running() {
            return;
        }
        self.cancel_token.read().await.cancel();
        *status = AgentStatus::Stopped;
    }
}

/// Trait for background agents
///
/// `start` runs the agent's loop until `stop` cancels it. Agents select over
/// their event source (timer, storage changes, requests) and a cancellation
/// token.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Returns the unique identifier for this agent
    fn id(&self) -> &'static str;

    /// Returns the display name for this agent
    fn name(&self) -> &'static str;

    /// Returns the current status of the agent
    fn status(&self) -> AgentStatus;

    /// Runs the agent until cancelled
    async fn start(&self) -> Result<(), AgentError>;

    /// Signals the agent to stop
    async fn stop(&self) -> Result<(), AgentError>;

    /// Performs the agent's action once, outside its schedule (if supported)
    async fn trigger(&self) -> Result<(), AgentError> {
        Ok(())
    }
}
