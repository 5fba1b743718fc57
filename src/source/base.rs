//! Base types and traits for gas price sources

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::GasSnapshot;

/// Field of the response payload that carries the source timestamp
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Prices arrive in wei; the store keeps whole gwei
const WEI_TO_GWEI: f64 = 1e-9;

/// Errors that can occur when fetching gas prices
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network error during fetch
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The price source answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Error parsing response data
    #[error("Parse error: {0}")]
    Parse(String),
}

/// A source of gas price snapshots
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns the identifier used in logs
    fn id(&self) -> &'static str;

    /// Fetches and normalizes the current prices
    async fn fetch(&self) -> Result<GasSnapshot, SourceError>;
}

/// Converts a response body of shape `{ data: { timestamp, <tier>: raw, ... } }`
/// into a snapshot
///
/// Every key other than `timestamp` is treated as a price in wei. Values that
/// do not start with an integer are skipped.
pub fn snapshot_from_response(body: &Value) -> Result<GasSnapshot, SourceError> {
    let data = body
        .get("data")
        .and_then(Value::as_object)
        .ok_or_else(|| SourceError::Parse("missing data object".into()))?;

    let raw_timestamp = data
        .get(TIMESTAMP_FIELD)
        .ok_or_else(|| SourceError::Parse("missing timestamp".into()))?;
    let timestamp = timestamp_millis(raw_timestamp)
        .ok_or_else(|| SourceError::Parse(format!("invalid timestamp {}", raw_timestamp)))?;

    let mut snapshot = GasSnapshot::new(timestamp);
    for (key, raw) in data.iter().filter(|(k, _)| k.as_str() != TIMESTAMP_FIELD) {
        match raw_to_gwei(raw) {
            Some(gwei) => {
                snapshot.prices.insert(key.clone(), gwei);
            }
            None => tracing::debug!("Skipping non-numeric price field {}: {}", key, raw),
        }
    }

    Ok(snapshot)
}

/// Epoch milliseconds from an integer, or a finite float within `i64` range
fn timestamp_millis(raw: &Value) -> Option<i64> {
    if let Some(ms) = raw.as_i64() {
        return Some(ms);
    }
    let ms = raw.as_f64()?.trunc();
    (ms.is_finite() && ms >= i64::MIN as f64 && ms < i64::MAX as f64).then_some(ms as i64)
}

/// `round(raw * 1e-9)` for a wei amount given as a number or a numeric string
pub fn raw_to_gwei(raw: &Value) -> Option<i64> {
    let wei = match raw {
        Value::Number(n) => n.as_f64().map(f64::trunc),
        Value::String(s) => leading_integer(s),
        _ => None,
    }?;

    Some((wei * WEI_TO_GWEI).round() as i64)
}

/// Parses the integer prefix of `s` after leading whitespace
fn leading_integer(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let (negative, rest) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s.strip_prefix('+').unwrap_or(s)),
    };

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
