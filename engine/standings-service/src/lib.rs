//! Standings Service Library
//!
//! Hosts the standings engine: Postgres-backed fact reader and leaderboard store,
//! JSON fixtures for offline runs, environment configuration, and logging setup.

pub mod config;
pub mod error;
pub mod fixture;
pub mod logging;
pub mod postgres;

pub use config::{DatabaseConfig, LoggingConfig, ServiceConfig};
pub use error::{Result, ServiceError};
pub use fixture::load_fixture;
pub use logging::initialize_logging;
pub use postgres::{connect, PgFactReader, PgLeaderboardStore};

use standings_engine::{
    FactReader, Leaderboard, LeaderboardKind, LeaderboardStore, OverallSource, RunRequest,
    StandingsEngine,
};

/// Compute every board in `request` without writing anything.
///
/// An Overall board folded from weekly rows reads whatever weekly rows the store
/// already holds.
pub async fn dry_run<F, S>(
    engine: &StandingsEngine<F, S>,
    request: &RunRequest,
    overall_source: OverallSource,
) -> Result<Vec<Leaderboard>>
where
    F: FactReader,
    S: LeaderboardStore,
{
    let mut boards = Vec::with_capacity(request.kinds.len());
    for kind in &request.kinds {
        let board = match kind {
            LeaderboardKind::Weekly => engine.compute_weekly(request.week).await?,
            LeaderboardKind::Overall => engine.compute_overall(request.week, overall_source).await?,
            LeaderboardKind::Survivor => engine.compute_survivor(request.week).await?,
        };
        boards.push(board);
    }
    Ok(boards)
}
