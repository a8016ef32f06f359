//! Fact reader trait, the per-run fact snapshot, and an in-memory reader

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::error::{Result, StandingsError};
use crate::types::{
    GameId, GameResult, LeaderboardKind, Pick, SurvivorPick, TiebreakerEntry, User, UserId, Week,
    WeekRange,
};

/// Read-only query layer over the pool's stored facts
#[async_trait]
pub trait FactReader: Send + Sync {
    async fn read_games(&self, weeks: WeekRange) -> Result<Vec<GameResult>>;

    /// Picks whose game falls inside `weeks`
    async fn read_picks(&self, weeks: WeekRange) -> Result<Vec<Pick>>;

    async fn read_tiebreakers(&self, week: Week) -> Result<Vec<TiebreakerEntry>>;

    async fn read_survivor_picks(&self, weeks: WeekRange) -> Result<Vec<SurvivorPick>>;

    async fn read_users(&self) -> Result<Vec<User>>;

    /// A named system configuration value, e.g. "PaymentDueWeek"
    async fn read_config(&self, name: &str) -> Result<Option<String>>;
}

/// Everything one leaderboard run needs, loaded up front
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactSnapshot {
    pub games: Vec<GameResult>,
    pub picks: Vec<Pick>,
    pub tiebreakers: Vec<TiebreakerEntry>,
    pub survivor_picks: Vec<SurvivorPick>,
    pub users: Vec<User>,
    /// Missed picks count only in weeks after this one; `None` disables the count
    pub payment_due_week: Option<Week>,
}

impl FactSnapshot {
    /// Load the facts a run of `kind` for `week` reads
    pub async fn load<F: FactReader + ?Sized>(
        reader: &F,
        kind: LeaderboardKind,
        week: Week,
        config: &EngineConfig,
    ) -> Result<Self> {
        let users = reader.read_users().await?;
        let payment_due_week =
            parse_payment_due_week(reader.read_config(&config.payment_due_week_key).await?)?;

        let snapshot = match kind {
            LeaderboardKind::Weekly => Self {
                games: reader.read_games(WeekRange::Only(week)).await?,
                picks: reader.read_picks(WeekRange::Only(week)).await?,
                tiebreakers: reader.read_tiebreakers(week).await?,
                survivor_picks: Vec::new(),
                users,
                payment_due_week,
            },
            // The elimination ceiling spans the whole schedule, not just weeks played
            LeaderboardKind::Overall => Self {
                games: reader.read_games(WeekRange::All).await?,
                picks: reader.read_picks(WeekRange::Through(week)).await?,
                tiebreakers: Vec::new(),
                survivor_picks: Vec::new(),
                users,
                payment_due_week,
            },
            LeaderboardKind::Survivor => Self {
                games: reader.read_games(WeekRange::Through(week)).await?,
                picks: Vec::new(),
                tiebreakers: Vec::new(),
                survivor_picks: reader.read_survivor_picks(WeekRange::Through(week)).await?,
                users,
                payment_due_week,
            },
        };

        tracing::debug!(
            kind = %kind,
            week,
            games = snapshot.games.len(),
            picks = snapshot.picks.len(),
            tiebreakers = snapshot.tiebreakers.len(),
            survivor_picks = snapshot.survivor_picks.len(),
            users = snapshot.users.len(),
            "Loaded fact snapshot"
        );

        Ok(snapshot)
    }

    pub fn games_by_id(&self) -> HashMap<GameId, &GameResult> {
        self.games.iter().map(|g| (g.game_id, g)).collect()
    }

    pub fn users_by_id(&self) -> HashMap<UserId, &User> {
        self.users.iter().map(|u| (u.user_id, u)).collect()
    }
}

/// Parse the stored "PaymentDueWeek" value
pub fn parse_payment_due_week(value: Option<String>) -> Result<Option<Week>> {
    match value {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<Week>().map(Some).map_err(|_| {
            StandingsError::input(format!("PaymentDueWeek '{}' is not a week number", raw))
        }),
    }
}

/// In-memory fact set, used by tests and offline fixture runs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemoryFacts {
    #[serde(default)]
    pub games: Vec<GameResult>,
    #[serde(default)]
    pub picks: Vec<Pick>,
    #[serde(default)]
    pub tiebreakers: Vec<TiebreakerEntry>,
    #[serde(default)]
    pub survivor_picks: Vec<SurvivorPick>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub config: HashMap<String, String>,
}

impl InMemoryFacts {
    pub fn new() -> Self {
        Self::default()
    }

    fn week_of(&self, game_id: GameId) -> Option<Week> {
        self.games.iter().find(|g| g.game_id == game_id).map(|g| g.week)
    }
}

#[async_trait]
impl FactReader for InMemoryFacts {
    async fn read_games(&self, weeks: WeekRange) -> Result<Vec<GameResult>> {
        Ok(self.games.iter().filter(|g| weeks.contains(g.week)).cloned().collect())
    }

    async fn read_picks(&self, weeks: WeekRange) -> Result<Vec<Pick>> {
        // Picks pointing at an unknown game are passed through so aggregation can reject them
        Ok(self
            .picks
            .iter()
            .filter(|p| self.week_of(p.game_id).map_or(true, |w| weeks.contains(w)))
            .cloned()
            .collect())
    }

    async fn read_tiebreakers(&self, week: Week) -> Result<Vec<TiebreakerEntry>> {
        Ok(self.tiebreakers.iter().filter(|t| t.week == week).cloned().collect())
    }

    async fn read_survivor_picks(&self, weeks: WeekRange) -> Result<Vec<SurvivorPick>> {
        Ok(self.survivor_picks.iter().filter(|s| weeks.contains(s.week)).cloned().collect())
    }

    async fn read_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    async fn read_config(&self, name: &str) -> Result<Option<String>> {
        Ok(self.config.get(name).cloned())
    }
}
