//! Tauri tray application
//!
//! The badge becomes the tray title, alerts go through the notification
//! plugin, and the panel renders into the webview through `panel://` events.

use std::sync::Arc;

use serde::Serialize;
use tauri::{
    async_runtime::JoinHandle,
    tray::{MouseButton, MouseButtonState, TrayIcon, TrayIconBuilder, TrayIconEvent},
    AppHandle, Emitter, Manager, PhysicalPosition, WindowEvent,
};
use tauri_plugin_notification::NotificationExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::commands;
use crate::config::AppConfig;
use crate::model::Tier;
use crate::panel::{PanelController, PanelView};
use crate::AppState;

const TRAY_ID: &str = "gas";
const PANEL_WINDOW: &str = "main";

// Panel window dimensions
const WINDOW_WIDTH: i32 = 300;
const WINDOW_HEIGHT: i32 = 360;
const MARGIN: i32 = 10;

#[derive(Clone, Serialize)]
struct PricePayload<'a> {
    tier: &'a str,
    gwei: i64,
}

#[derive(Clone, Serialize)]
struct TextPayload<'a> {
    text: Option<&'a str>,
}

#[derive(Clone, Serialize)]
struct LevelPayload {
    level: Tier,
}

#[derive(Clone, Serialize)]
struct VisiblePayload {
    visible: bool,
}

/// Panel view that forwards every render to the webview as an event
pub struct TauriPanelView {
    app: AppHandle,
}

impl TauriPanelView {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn emit<S: Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app.emit(event, payload) {
            tracing::warn!("Failed to emit {}: {}", event, e);
        }
    }
}

impl PanelView for TauriPanelView {
    fn show_price(&self, tier: &str, gwei: i64) {
        self.emit("panel://price", PricePayload { tier, gwei });
    }

    fn show_last_update(&self, elapsed: &str) {
        self.emit("panel://last-update", TextPayload { text: Some(elapsed) });
    }

    fn show_alert_banner(&self, text: Option<String>) {
        self.emit(
            "panel://alert-banner",
            TextPayload {
                text: text.as_deref(),
            },
        );
    }

    fn mark_selected(&self, level: Tier) {
        self.emit("panel://selected", LevelPayload { level });
    }

    fn show_alert_tier(&self, level: Tier) {
        self.emit("panel://alert-tier", LevelPayload { level });
    }

    fn set_alert_form_visible(&self, visible: bool) {
        self.emit("panel://alert-form", VisiblePayload { visible });
    }

    fn reset_alert_input(&self, value: &str) {
        self.emit("panel://alert-input", TextPayload { text: Some(value) });
    }
}

/// The panel controller plus the task running it while the window is shown
pub struct PanelSession {
    pub controller: Arc<PanelController>,
    running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PanelSession {
    pub fn new(controller: Arc<PanelController>) -> Self {
        Self {
            controller,
            running: Mutex::new(None),
        }
    }

    /// Opens the panel, restarting it if it was already running
    pub async fn show(&self) {
        self.hide().await;

        let token = CancellationToken::new();
        let controller = self.controller.clone();
        let run_token = token.clone();
        let handle = tauri::async_runtime::spawn(async move {
            controller.run(run_token).await;
        });

        *self.running.lock().await = Some((token, handle));
    }

    /// Closes the panel and waits for its task to finish
    pub async fn hide(&self) {
        if let Some((token, handle)) = self.running.lock().await.take() {
            token.cancel();
            let _ = handle.await;
        }
    }
}

fn set_badge(tray: &TrayIcon, text: &str, level: Tier) {
    if let Err(e) = tray.set_title(Some(text)) {
        tracing::warn!("Failed to set tray title: {}", e);
    }
    let tooltip = format!("Gas Watcher - {} {} gwei", level, text);
    if let Err(e) = tray.set_tooltip(Some(tooltip)) {
        tracing::warn!("Failed to set tray tooltip: {}", e);
    }
}

fn toggle_panel(tray: &TrayIcon) {
    let app = tray.app_handle();
    let Some(window) = app.get_webview_window(PANEL_WINDOW) else {
        return;
    };
    let Some(session) = app.try_state::<Arc<PanelSession>>() else {
        return;
    };
    let session = session.inner().clone();

    if window.is_visible().unwrap_or(false) {
        let _ = window.hide();
        tauri::async_runtime::spawn(async move { session.hide().await });
        return;
    }

    // Horizontally centered on the tray icon, above the taskbar
    if let Some(rect) = tray.rect().ok().flatten() {
        let (tray_x, tray_y) = match rect.position {
            tauri::Position::Physical(p) => (p.x, p.y),
            tauri::Position::Logical(l) => (l.x as i32, l.y as i32),
        };
        let tray_w = match rect.size {
            tauri::Size::Physical(s) => s.width as i32,
            tauri::Size::Logical(s) => s.width as i32,
        };

        let x = tray_x + (tray_w / 2) - (WINDOW_WIDTH / 2);
        let y = (tray_y - WINDOW_HEIGHT - MARGIN).max(0);
        let _ = window.set_position(tauri::Position::Physical(PhysicalPosition::new(x, y)));
    }

    let _ = window.show();
    let _ = window.set_focus();
    tauri::async_runtime::spawn(async move { session.show().await });
}

/// Initializes and runs the Tauri application
pub fn run() -> anyhow::Result<()> {
    let config = AppConfig::load();

    tauri::Builder::default()
        .plugin(tauri_plugin_notification::init())
        .setup(move |app| {
            let handle = app.handle().clone();

            let mut tray = TrayIconBuilder::with_id(TRAY_ID)
                .tooltip("Gas Watcher")
                .on_tray_icon_event(|tray, event| {
                    if let TrayIconEvent::Click {
                        button: MouseButton::Left,
                        button_state: MouseButtonState::Up,
                        ..
                    } = event
                    {
                        toggle_panel(tray);
                    }
                });
            if let Some(icon) = app.default_window_icon() {
                tray = tray.icon(icon.clone());
            }
            tray.build(app)?;

            let state = tauri::async_runtime::block_on(AppState::new(config.clone()))?;
            let state = Arc::new(state);

            let badge_handle = handle.clone();
            let notify_handle = handle.clone();
            tauri::async_runtime::block_on(async {
                state
                    .badge
                    .on_badge(move |badge| {
                        if let Some(tray) = badge_handle.tray_by_id(TRAY_ID) {
                            set_badge(&tray, &badge.text, badge.level);
                        }
                    })
                    .await;
                state
                    .notification
                    .on_notify(move |notification| {
                        let shown = notify_handle
                            .notification()
                            .builder()
                            .title(&notification.title)
                            .body(&notification.body)
                            .icon(&notification.icon)
                            .show();
                        if let Err(e) = shown {
                            tracing::warn!("Failed to show notification: {}", e);
                        }
                    })
                    .await;
            });

            let view = Arc::new(TauriPanelView::new(handle.clone()));
            let session = Arc::new(PanelSession::new(Arc::new(state.panel(view))));

            app.manage(state.clone());
            app.manage(session.clone());

            tauri::async_runtime::spawn(async move {
                if let Err(e) = state.agent_manager.start_all().await {
                    tracing::error!("Failed to start agents: {}", e);
                }
            });

            // Hide the panel when it loses focus
            if let Some(window) = app.get_webview_window(PANEL_WINDOW) {
                let window_clone = window.clone();
                window.on_window_event(move |event| {
                    if let WindowEvent::Focused(false) = event {
                        let _ = window_clone.hide();
                        let session = session.clone();
                        tauri::async_runtime::spawn(async move { session.hide().await });
                    }
                });
            }

            tracing::info!("Gas Watcher initialized successfully");
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            // Panel commands
            commands::panel_opened,
            commands::panel_hidden,
            commands::select_level,
            commands::open_alert_form,
            commands::submit_alert,
            commands::cancel_alert,
            // Agent commands
            commands::trigger_refresh,
            commands::get_agent_status,
            // Config commands
            commands::get_config,
            commands::save_config,
        ])
        .run(tauri::generate_context!())?;

    Ok(())
}
