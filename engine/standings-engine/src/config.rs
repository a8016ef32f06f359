//! Engine configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StandingsError;

/// Name of the system value holding the payment due week
pub const DEFAULT_PAYMENT_DUE_WEEK_KEY: &str = "PaymentDueWeek";

/// Where the Overall leaderboard gets its per-user totals from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSource {
    /// Aggregate directly from picks and games
    #[default]
    Picks,
    /// Fold the persisted weekly rows for weeks 1..=W
    WeeklyRows,
}

impl FromStr for OverallSource {
    type Err = StandingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "picks" => Ok(Self::Picks),
            "weekly" | "weekly_rows" | "weekly-rows" => Ok(Self::WeeklyRows),
            other => Err(StandingsError::config(format!("unknown overall source '{}'", other))),
        }
    }
}

impl fmt::Display for OverallSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Picks => f.write_str("picks"),
            Self::WeeklyRows => f.write_str("weekly"),
        }
    }
}

/// Configuration for the standings engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default aggregation path for the Overall leaderboard
    pub overall_source: OverallSource,

    /// Treat a weekly entrant without a tiebreaker entry as an input error
    /// instead of ranking them with an empty tiebreaker
    pub require_tiebreakers: bool,

    /// System value name for the payment due week
    pub payment_due_week_key: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            overall_source: OverallSource::Picks,
            require_tiebreakers: false,
            payment_due_week_key: DEFAULT_PAYMENT_DUE_WEEK_KEY.to_string(),
        }
    }
}

impl EngineConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), StandingsError> {
        if self.payment_due_week_key.trim().is_empty() {
            return Err(StandingsError::config("payment due week key must not be empty"));
        }
        Ok(())
    }
}
