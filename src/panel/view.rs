//! Rendering seam between the panel controller and whatever draws it

use crate::model::Tier;

/// Surface the panel controller renders into
///
/// Calls are fire-and-forget; a view that is no longer shown may ignore them.
#[cfg_attr(test, mockall::automock)]
pub trait PanelView: Send + Sync {
    /// Shows the price of one tier row
    fn show_price(&self, tier: &str, gwei: i64);

    /// Shows the time since the last price update
    fn show_last_update(&self, elapsed: &str);

    /// Shows the alert banner, or hides it on `None`
    fn show_alert_banner(&self, text: Option<String>);

    /// Marks the tier row selected and clears the others
    fn mark_selected(&self, level: Tier);

    /// Shows the tier the alert form applies to
    fn show_alert_tier(&self, level: Tier);

    fn set_alert_form_visible(&self, visible: bool);

    fn reset_alert_input(&self, value: &str);
}
