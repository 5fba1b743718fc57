//! Agent manager - Orchestrates the background agents
//!
//! Agents are started in registration order, each on its own task.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::base::{Agent, AgentError, AgentStatus};

/// Manages the lifecycle of the registered agents
pub struct AgentManager {
    agents: RwLock<Vec<Arc<dyn Agent>>>,
    handles: RwLock<HashMap<&'static str, JoinHandle<()>>>,
}

impl AgentManager {
    /// Creates a new AgentManager
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an agent, replacing any agent with the same id
    pub async fn register(&self, agent: Arc<dyn Agent>) {
        let mut agents = self.agents.write().await;
        agents.retain(|a| a.id() != agent.id());
        agents.push(agent);
    }

    /// Gets an agent by ID
    pub async fn get(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.agents
            .read()
            .await
            .iter()
            .find(|a| a.id() == id)
            .cloned()
    }

    /// Starts every agent that is not already running
    pub async fn start_all(&self) -> Result<(), AgentError> {
        let agents = self.agents.read().await.clone();

        for agent in agents {
            if agent.status().is_stopped() {
                self.spawn(agent).await;
            }
        }

        Ok(())
    }

    async fn spawn(&self, agent: Arc<dyn Agent>) {
        let id = agent.id();
        let runner = Arc::clone(&agent);

        let handle = tokio::spawn(async move {
            if let Err(e) = runner.start().await {
                tracing::error!("Agent '{}' error: {}", runner.id(), e);
            }
        });

        if let Some(previous) = self.handles.write().await.insert(id, handle) {
            previous.abort();
        }

        tracing::info!("Started agent: {}", agent.name());
    }

    /// Stops every running agent
    pub async fn stop_all(&self) -> Result<(), AgentError> {
        let agents = self.agents.read().await.clone();

        for agent in agents {
            agent.stop().await?;
            if let Some(handle) = self.handles.write().await.remove(agent.id()) {
                handle.abort();
            }
            tracing::info!("Stopped agent: {}", agent.name());
        }

        Ok(())
    }

    /// Status of every agent, in registration order
    pub async fn status(&self) -> Vec<(&'static str, AgentStatus)> {
        self.agents
            .read()
            .await
            .iter()
            .map(|a| (a.id(), a.status()))
            .collect()
    }

    /// Returns the number of registered agents
    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Triggers a specific agent
    pub async fn trigger_agent(&self, id: &str) -> Result<(), AgentError> {
        match self.get(id).await {
            Some(agent) => agent.trigger().await,
            None => Err(AgentError::OperationFailed(format!(
                "Agent '{}' not found",
                id
            ))),
        }
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new()
    }
}
