//! Tauri IPC Commands
//!
//! All commands that can be called from the panel webview via Tauri IPC.

use std::sync::Arc;

use crate::config::AppConfig;
use crate::desktop::PanelSession;
use crate::model::{Alert, Tier};
use crate::AppState;

// ============================================================================
// Panel Commands
// ============================================================================

/// Starts rendering into the panel
#[tauri::command]
pub async fn panel_opened(session: tauri::State<'_, Arc<PanelSession>>) -> Result<(), String> {
    session.show().await;
    Ok(())
}

/// Stops rendering into the panel
#[tauri::command]
pub async fn panel_hidden(session: tauri::State<'_, Arc<PanelSession>>) -> Result<(), String> {
    session.hide().await;
    Ok(())
}

/// Makes `level` the tier shown on the badge
#[tauri::command]
pub async fn select_level(
    session: tauri::State<'_, Arc<PanelSession>>,
    level: Tier,
) -> Result<(), String> {
    session
        .controller
        .select_level(level)
        .await
        .map_err(|e| e.to_string())
}

/// Handles a click on a tier's bell, returns whether the form is now visible
#[tauri::command]
pub async fn open_alert_form(
    session: tauri::State<'_, Arc<PanelSession>>,
    level: Tier,
) -> Result<bool, String> {
    session
        .controller
        .open_alert_form(level)
        .await
        .map_err(|e| e.to_string())
}

/// Submits the alert form, returns the stored alert or `None` if the input was rejected
#[tauri::command]
pub async fn submit_alert(
    session: tauri::State<'_, Arc<PanelSession>>,
    value: String,
) -> Result<Option<Alert>, String> {
    session
        .controller
        .submit_alert(&value)
        .await
        .map_err(|e| e.to_string())
}

/// Cancels the pending alert
#[tauri::command]
pub async fn cancel_alert(session: tauri::State<'_, Arc<PanelSession>>) -> Result<(), String> {
    session
        .controller
        .cancel_alert()
        .await
        .map_err(|e| e.to_string())
}

// ============================================================================
// Agent Commands
// ============================================================================

/// Asks the refresh agent for fresh gas data
#[tauri::command]
pub async fn trigger_refresh(state: tauri::State<'_, Arc<AppState>>) -> Result<(), String> {
    state
        .requester
        .fetch_gas_data()
        .map_err(|e| e.to_string())
}

/// Gets the status of all agents
#[tauri::command]
pub async fn get_agent_status(
    state: tauri::State<'_, Arc<AppState>>,
) -> Result<Vec<(String, String)>, String> {
    let status = state.agent_manager.status().await;
    Ok(status
        .into_iter()
        .map(|(id, s)| (id.to_string(), format!("{:?}", s)))
        .collect())
}

// ============================================================================
// Configuration Commands
// ============================================================================

/// Gets the current configuration
#[tauri::command]
pub fn get_config() -> Result<AppConfig, String> {
    Ok(AppConfig::load())
}

/// Saves the configuration; takes effect on next start
#[tauri::command]
pub fn save_config(config: AppConfig) -> Result<(), String> {
    config.save().map_err(|e| e.to_string())
}
