//! # Standings Engine
//!
//! Runs the read → aggregate → validate → rank → eliminate → replace pipeline for each
//! requested leaderboard kind. Everything before `replace` is side-effect free, so a
//! failed run leaves the previously stored snapshot in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::aggregation::{
    aggregate_survivor, aggregate_weekly, check_score_invariants, check_unique_users,
    schedule_ceiling, FromPicks, FromWeeklyRows, OverallAggregator,
};
use crate::config::{EngineConfig, OverallSource};
use crate::elimination::{eliminate_overall, eliminate_survivor, eliminate_weekly};
use crate::error::{Result, StandingsError};
use crate::facts::{FactReader, FactSnapshot};
use crate::ranking::{OVERALL_POLICY, SURVIVOR_POLICY, WEEKLY_POLICY};
use crate::store::LeaderboardStore;
use crate::types::{Leaderboard, LeaderboardKind, Week, WeekRange};

/// Which boards to rebuild for which week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub week: Week,
    pub kinds: Vec<LeaderboardKind>,
}

impl RunRequest {
    pub fn new(week: Week, kinds: Vec<LeaderboardKind>) -> Self {
        Self { week, kinds }
    }

    /// Overall, Weekly, and Survivor for `week`
    pub fn all(week: Week) -> Self {
        Self::new(
            week,
            vec![LeaderboardKind::Overall, LeaderboardKind::Weekly, LeaderboardKind::Survivor],
        )
    }

    fn wants(&self, kind: LeaderboardKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Summary of one completed leaderboard replacement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub kind: LeaderboardKind,
    pub week: Week,
    pub rows: usize,
    pub tied: usize,
    pub eliminated: usize,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    fn new(run_id: Uuid, board: &Leaderboard) -> Self {
        let (tied, eliminated) = board.flag_counts();
        Self {
            run_id,
            kind: board.kind(),
            week: board.week(),
            rows: board.len(),
            tied,
            eliminated,
            completed_at: Utc::now(),
        }
    }
}

fn validate_week(week: Week) -> Result<()> {
    if week == 0 {
        return Err(StandingsError::config("week numbers start at 1"));
    }
    Ok(())
}

/// Rank and flag a Weekly board from an already loaded snapshot
pub fn build_weekly(facts: &FactSnapshot, week: Week, config: &EngineConfig) -> Result<Leaderboard> {
    let rows = aggregate_weekly(facts, week, config)?;
    check_score_invariants(&rows, |r| &r.score)?;

    let mut ranked = WEEKLY_POLICY.rank(rows);
    eliminate_weekly(&mut ranked);

    Ok(Leaderboard::Weekly { week, rows: ranked })
}

/// Rank and flag an Overall board; `aggregator` picks the aggregation path
pub fn build_overall(
    facts: &FactSnapshot,
    through_week: Week,
    aggregator: &dyn OverallAggregator,
) -> Result<Leaderboard> {
    let rows = aggregator.aggregate(facts, through_week)?;
    check_score_invariants(&rows, |r| &r.score)?;

    let mut ranked = OVERALL_POLICY.rank(rows);
    eliminate_overall(&mut ranked, schedule_ceiling(&facts.games, WeekRange::All));

    Ok(Leaderboard::Overall { through_week, rows: ranked })
}

pub fn build_survivor(facts: &FactSnapshot, week: Week) -> Result<Leaderboard> {
    let rows = aggregate_survivor(facts, week)?;
    check_unique_users(&rows)?;

    let mut ranked = SURVIVOR_POLICY.rank(rows);
    eliminate_survivor(&mut ranked);

    Ok(Leaderboard::Survivor { week, rows: ranked })
}

/// Standings pipeline over a fact reader and a leaderboard store
pub struct StandingsEngine<F, S> {
    config: EngineConfig,
    facts: F,
    store: S,
}

impl<F: FactReader, S: LeaderboardStore> StandingsEngine<F, S> {
    pub fn new(config: EngineConfig, facts: F, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, facts, store })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn facts(&self) -> &F {
        &self.facts
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Compute the Weekly board without writing it
    pub async fn compute_weekly(&self, week: Week) -> Result<Leaderboard> {
        validate_week(week)?;
        let facts = FactSnapshot::load(&self.facts, LeaderboardKind::Weekly, week, &self.config).await?;
        build_weekly(&facts, week, &self.config)
    }

    /// Compute the Overall board without writing it.
    ///
    /// `OverallSource::WeeklyRows` folds the weekly rows already in the store.
    pub async fn compute_overall(&self, week: Week, source: OverallSource) -> Result<Leaderboard> {
        validate_week(week)?;
        let facts = FactSnapshot::load(&self.facts, LeaderboardKind::Overall, week, &self.config).await?;
        match source {
            OverallSource::Picks => build_overall(&facts, week, &FromPicks),
            OverallSource::WeeklyRows => {
                let weekly_rows = self.store.load_weekly_rows(week).await?;
                if weekly_rows.is_empty() {
                    tracing::warn!(week, "No stored weekly rows to fold, the Overall board will be empty");
                }
                tracing::debug!(rows = weekly_rows.len(), "Folding stored weekly rows");
                build_overall(&facts, week, &FromWeeklyRows { weekly_rows: &weekly_rows })
            }
        }
    }

    /// Compute the Survivor board without writing it
    pub async fn compute_survivor(&self, week: Week) -> Result<Leaderboard> {
        validate_week(week)?;
        let facts = FactSnapshot::load(&self.facts, LeaderboardKind::Survivor, week, &self.config).await?;
        build_survivor(&facts, week)
    }

    pub async fn run_weekly(&self, week: Week) -> Result<RunReport> {
        self.execute(LeaderboardKind::Weekly, week, self.compute_weekly(week)).await
    }

    pub async fn run_overall(&self, week: Week, source: OverallSource) -> Result<RunReport> {
        self.execute(LeaderboardKind::Overall, week, self.compute_overall(week, source)).await
    }

    pub async fn run_survivor(&self, week: Week) -> Result<RunReport> {
        self.execute(LeaderboardKind::Survivor, week, self.compute_survivor(week)).await
    }

    /// Run every kind in `request`.
    ///
    /// Independent kinds run concurrently. Overall folded from weekly rows waits for the
    /// Weekly run of the same week, which is added when not requested. Reports follow the
    /// request order, with an added Weekly run first.
    pub async fn run(&self, request: &RunRequest) -> Result<Vec<RunReport>> {
        validate_week(request.week)?;
        if request.kinds.is_empty() {
            return Err(StandingsError::config("no leaderboard kinds selected"));
        }

        let week = request.week;
        let source = self.config.overall_source;
        let sequenced = request.wants(LeaderboardKind::Overall) && source == OverallSource::WeeklyRows;

        let weekly_chain = async {
            let weekly = if request.wants(LeaderboardKind::Weekly) || sequenced {
                Some(self.run_weekly(week).await?)
            } else {
                None
            };
            let overall = if sequenced { Some(self.run_overall(week, source).await?) } else { None };
            Ok::<_, StandingsError>((weekly, overall))
        };
        let overall = async {
            if request.wants(LeaderboardKind::Overall) && !sequenced {
                self.run_overall(week, source).await.map(Some)
            } else {
                Ok(None)
            }
        };
        let survivor = async {
            if request.wants(LeaderboardKind::Survivor) {
                self.run_survivor(week).await.map(Some)
            } else {
                Ok(None)
            }
        };

        let ((mut weekly, chained_overall), independent_overall, mut survivor) =
            tokio::try_join!(weekly_chain, overall, survivor)?;
        let mut overall = chained_overall.or(independent_overall);

        let mut reports = Vec::with_capacity(3);
        if !request.wants(LeaderboardKind::Weekly) {
            reports.extend(weekly.take());
        }
        for kind in &request.kinds {
            let slot = match kind {
                LeaderboardKind::Weekly => &mut weekly,
                LeaderboardKind::Overall => &mut overall,
                LeaderboardKind::Survivor => &mut survivor,
            };
            reports.extend(slot.take());
        }

        Ok(reports)
    }

    async fn execute(
        &self,
        kind: LeaderboardKind,
        week: Week,
        compute: impl Future<Output = Result<Leaderboard>>,
    ) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("standings_run", %run_id, %kind, week);

        async move {
            let board = compute.await?;
            self.store.replace(&board).await?;

            let report = RunReport::new(run_id, &board);
            info!(
                rows = report.rows,
                tied = report.tied,
                eliminated = report.eliminated,
                "Leaderboard replaced"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }
}
