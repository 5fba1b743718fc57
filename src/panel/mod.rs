//! Panel module - The popup that shows prices and edits level and alert

mod controller;
mod format;
mod view;

pub use controller::{now_millis, PanelConfig, PanelController};
pub use format::{alert_banner_text, elapsed_seconds, format_elapsed, parse_alert_value};
pub use view::PanelView;
