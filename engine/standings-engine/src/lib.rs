//! # Standings Engine
//!
//! This crate computes the standings of a pick'em pool: a Weekly board per week, a
//! season-long Overall board, and a Survivor board. Each board is rebuilt from raw facts
//! (games, picks, tiebreakers, survivor picks) and replaced as a whole.
//!
//! ## Architecture
//!
//! - **FactReader**: read-only access to games, picks, users, and system values
//! - **Aggregation**: folds facts into one metric row per user per scope
//! - **Ranking**: one dense-rank fold, configured per board by a `RankingPolicy`
//! - **Elimination**: flags users who can no longer catch the leader
//! - **LeaderboardStore**: atomic replace of a whole board
//! - **StandingsEngine**: sequences the stages for the requested boards
//!
//! ## Usage
//!
//! ```rust
//! use standings_engine::{
//!     EngineConfig, InMemoryFacts, InMemoryLeaderboardStore, RunRequest, StandingsEngine,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = StandingsEngine::new(
//!         EngineConfig::default(),
//!         InMemoryFacts::new(),
//!         InMemoryLeaderboardStore::new(),
//!     )?;
//!
//!     let reports = engine.run(&RunRequest::all(1)).await?;
//!     assert_eq!(reports.len(), 3);
//!     assert!(reports.iter().all(|r| r.rows == 0));
//!
//!     Ok(())
//! }
//! ```

pub mod aggregation;
pub mod config;
pub mod elimination;
pub mod engine;
pub mod error;
pub mod facts;
pub mod ranking;
pub mod store;
pub mod types;

pub use aggregation::{FromPicks, FromWeeklyRows, OverallAggregator};
pub use config::{EngineConfig, OverallSource};
pub use engine::{build_overall, build_survivor, build_weekly, RunReport, RunRequest, StandingsEngine};
pub use error::{Result, StandingsError};
pub use facts::{FactReader, FactSnapshot, InMemoryFacts};
pub use ranking::{RankingPolicy, OVERALL_POLICY, SURVIVOR_POLICY, WEEKLY_POLICY};
pub use store::{InMemoryLeaderboardStore, LeaderboardStore};
pub use types::*;

#[cfg(test)]
mod tests;
