//! Text helpers for the panel

use crate::model::Alert;

/// Whole seconds from `timestamp_ms` to `now_ms`, never negative
pub fn elapsed_seconds(timestamp_ms: i64, now_ms: i64) -> i64 {
    now_ms.saturating_sub(timestamp_ms).div_euclid(1000).max(0)
}

/// "N second(s)" below a minute, "N minute(s)" after
pub fn format_elapsed(seconds: i64) -> String {
    fn plural(n: i64, unit: &str) -> String {
        if n == 1 {
            format!("{} {}", n, unit)
        } else {
            format!("{} {}s", n, unit)
        }
    }

    if seconds >= 60 {
        plural(seconds / 60, "minute")
    } else {
        plural(seconds, "second")
    }
}

/// Banner text for a pending alert, `None` when the banner should be hidden
pub fn alert_banner_text(alert: Option<&Alert>) -> Option<String> {
    let alert = alert.filter(|a| a.is_pending())?;
    let level = alert.level.map(|l| l.as_str()).unwrap_or("unknown");
    Some(format!(
        "Notification set for {} at {} gwei.",
        level, alert.value
    ))
}

/// Parses the alert form input; only positive integers are accepted
pub fn parse_alert_value(input: &str) -> Option<i64> {
    input.trim().parse::<i64>().ok().filter(|v| *v > 0)
}
