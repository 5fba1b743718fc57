//! Core data types shared by the agents and the panel
//!
//! Price tiers, the stored gas snapshot, and the one-shot price alert.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a tier name is not one of the known speed categories
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown gas price tier: {0}")]
pub struct UnknownTier(pub String);

/// Gas price speed category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Rapid,
    Fast,
    Standard,
    Slow,
}

impl Tier {
    /// All tiers in display order
    pub const ALL: [Tier; 4] = [Tier::Rapid, Tier::Fast, Tier::Standard, Tier::Slow];

    /// Storage and display name
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Rapid => "rapid",
            Tier::Fast => "fast",
            Tier::Standard => "standard",
            Tier::Slow => "slow",
        }
    }

    /// Badge background color for this tier
    pub fn color(&self) -> &'static str {
        match self {
            Tier::Rapid => "#00c718",
            Tier::Fast => "#ff7828",
            Tier::Standard => "#0060ff",
            Tier::Slow => "#9160f2",
        }
    }

    /// Position of the tier in the panel list
    pub fn index(&self) -> usize {
        match self {
            Tier::Rapid => 0,
            Tier::Fast => 1,
            Tier::Standard => 2,
            Tier::Slow => 3,
        }
    }

    /// Looks up a tier by its panel list position
    pub fn from_index(index: usize) -> Option<Tier> {
        Tier::ALL.get(index).copied()
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Standard
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

/// Latest fetched gas prices, in whole gwei, plus the source timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasSnapshot {
    /// Price per tier name. Normally exactly the four known tiers.
    #[serde(rename = "gasPrices")]
    pub prices: BTreeMap<String, i64>,
    /// Epoch milliseconds reported by the price source
    pub timestamp: i64,
}

impl GasSnapshot {
    /// Creates an empty snapshot for the given timestamp
    pub fn new(timestamp: i64) -> Self {
        Self {
            prices: BTreeMap::new(),
            timestamp,
        }
    }

    /// Sets the price of a tier
    pub fn with_price(mut self, tier: Tier, gwei: i64) -> Self {
        self.prices.insert(tier.as_str().to_string(), gwei);
        self
    }

    /// Returns the price for a tier, if present
    pub fn price(&self, tier: Tier) -> Option<i64> {
        self.prices.get(tier.as_str()).copied()
    }

    /// Returns the price for a tier only when it can be shown on the badge
    pub fn badge_price(&self, tier: Tier) -> Option<i64> {
        self.price(tier).filter(|p| *p > 0)
    }

    /// Milliseconds elapsed between the snapshot and `now_ms`
    pub fn age_millis(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.timestamp)
    }
}

/// One-shot price threshold for a tier
///
/// An alert is pending while `value > 0`. Clearing it writes a zero value,
/// either with no tier (fired) or with `standard` (cancelled by the user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub level: Option<Tier>,
    pub value: i64,
}

impl Alert {
    /// Creates a pending alert
    pub fn new(level: Tier, value: i64) -> Self {
        Self {
            level: Some(level),
            value,
        }
    }

    /// The value written once the alert has fired
    pub fn fired() -> Self {
        Self {
            level: None,
            value: 0,
        }
    }

    /// The value written when the user cancels the alert
    pub fn cancelled() -> Self {
        Self {
            level: Some(Tier::Standard),
            value: 0,
        }
    }

    /// Returns true if the alert still waits for its threshold
    pub fn is_pending(&self) -> bool {
        self.value > 0
    }
}
