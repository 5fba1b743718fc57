//! Agent module - Background tasks of the watcher
//!
//! Provides agents for:
//! - Scheduled and on-demand refresh of gas prices
//! - Badge updates when prices or the selected tier change
//! - One-shot alert notifications

mod badge_agent;
mod base;
mod manager;
mod notification_agent;
mod refresh_agent;

pub use badge_agent::{Badge, BadgeAgent, BadgeCallback};
pub use base::{Agent, AgentError, AgentStatus};
pub use manager::AgentManager;
pub use notification_agent::{
    Notification, NotificationAction, NotificationAgent, NotifyCallback, NOTIFICATION_TITLE,
};
pub use refresh_agent::{
    RefreshAgent, RefreshConfig, RefreshRequest, RefreshRequester, SnapshotCallback,
    REFRESH_ALARM,
};
