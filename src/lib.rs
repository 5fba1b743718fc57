//! Gas Watcher - Ethereum gas prices on a badge, with one-shot alerts
//!
//! Polls a public gas price API once per minute, shows the price of the
//! selected speed tier on a colored badge, and notifies once when the
//! watched tier drops to a user-set threshold.
//!
//! ## Architecture
//!
//! - **Source**: the gas price endpoint and its response normalization
//! - **Storage**: two key-value partitions with change notification
//! - **Agents**: background tasks (refresh, badge, notifications)
//! - **Panel**: the popup controller, rendering through a `PanelView`
//!
//! The `desktop` feature wraps all of it in a Tauri tray application;
//! without it the binary runs the agents headless and logs badges and
//! notifications.

pub mod agents;
#[cfg(feature = "desktop")]
mod commands;
pub mod config;
#[cfg(feature = "desktop")]
mod desktop;
pub mod model;
pub mod panel;
pub mod source;
pub mod storage;

use std::sync::Arc;

use anyhow::Context;

use agents::{AgentManager, BadgeAgent, NotificationAgent, RefreshAgent, RefreshRequester};
use config::AppConfig;
use panel::{PanelController, PanelView};
use source::{GasNowSource, PriceSource};
use storage::Storage;

/// Application state shared by the agents and the panel
pub struct AppState {
    /// Agent manager for background tasks
    pub agent_manager: AgentManager,
    pub storage: Arc<Storage>,
    /// Sends refresh requests to the refresh agent
    pub requester: RefreshRequester,
    pub refresh: Arc<RefreshAgent>,
    pub badge: Arc<BadgeAgent>,
    pub notification: Arc<NotificationAgent>,
    pub config: AppConfig,
}

impl AppState {
    /// Creates the state from configuration, opening persisted storage if enabled
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let storage = match AppConfig::storage_dir() {
            Some(dir) if config.persist_storage => Storage::open(&dir)
                .await
                .with_context(|| format!("Failed to open storage at {}", dir.display()))?,
            _ => Storage::in_memory(),
        };
        let source = Arc::new(GasNowSource::with_config(config.source_config()));

        Ok(Self::with_parts(config, Arc::new(storage), source).await)
    }

    /// Creates the state around an existing store and price source
    pub async fn with_parts(
        config: AppConfig,
        storage: Arc<Storage>,
        source: Arc<dyn PriceSource>,
    ) -> Self {
        let agent_manager = AgentManager::new();

        let badge = Arc::new(BadgeAgent::new(storage.clone()));
        let notification = Arc::new(NotificationAgent::new(storage.clone()));
        let refresh = Arc::new(RefreshAgent::with_config(
            config.refresh_config(),
            source,
            storage.clone(),
        ));
        let requester = refresh.requester();

        // Listeners first so the first fetch is seen by both
        agent_manager.register(badge.clone()).await;
        agent_manager.register(notification.clone()).await;
        agent_manager.register(refresh.clone()).await;

        Self {
            agent_manager,
            storage,
            requester,
            refresh,
            badge,
            notification,
            config,
        }
    }

    /// Creates a panel controller rendering into `view`
    pub fn panel(&self, view: Arc<dyn PanelView>) -> PanelController {
        PanelController::with_config(
            self.config.panel_config(),
            self.storage.clone(),
            self.requester.clone(),
            view,
        )
    }
}

/// Installs the global tracing subscriber
pub fn init_tracing() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("gaswatcher_lib=debug".parse()?)
        .add_directive("info".parse()?);

    // A subscriber installed earlier (tests, embedding) wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
    Ok(())
}

/// Runs the application
///
/// Starts the Tauri tray app when built with the `desktop` feature,
/// the headless agents otherwise.
pub fn run() -> anyhow::Result<()> {
    init_tracing()?;
    tracing::info!("Starting Gas Watcher...");

    #[cfg(feature = "desktop")]
    {
        desktop::run()
    }

    #[cfg(not(feature = "desktop"))]
    {
        run_headless()
    }
}

#[cfg(not(feature = "desktop"))]
fn run_headless() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async {
        let state = AppState::new(AppConfig::load()).await?;

        state
            .badge
            .on_badge(|badge| {
                tracing::info!("Badge: {} ({}) {}", badge.text, badge.level, badge.color);
            })
            .await;
        state
            .notification
            .on_notify(|notification| {
                tracing::info!("{}: {}", notification.title, notification.body);
            })
            .await;

        state.agent_manager.start_all().await?;
        tracing::info!("Gas Watcher running, press Ctrl+C to stop");

        tokio::signal::ctrl_c().await?;

        tracing::info!("Shutting down...");
        state.agent_manager.stop_all().await?;
        Ok(())
    })
}
