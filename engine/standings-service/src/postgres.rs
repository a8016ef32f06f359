//! Postgres-backed fact reader and leaderboard store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{FromRow, Postgres};
use tracing::{debug, info};

use standings_engine::{
    Entrant, FactReader, GameResult, GameStatus, Leaderboard, LeaderboardKind, LeaderboardStore, MetricRow,
    OverallRow, Pick, Ranked, Result, ScoreLine, SnapshotKey, StandingsError, SurvivorPick,
    SurvivorRow, SurvivorStatus, TiebreakerEntry, TiebreakerLine, User, Week, WeekRange, WeeklyRow,
};

use crate::config::ServiceConfig;

/// Open the connection pool and apply migrations when configured to
pub async fn connect(config: &ServiceConfig) -> crate::error::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    Ok(pool)
}

fn read_error(e: sqlx::Error) -> StandingsError {
    StandingsError::fact_read(e.to_string())
}

fn store_error(e: sqlx::Error) -> StandingsError {
    StandingsError::persistence(e.to_string())
}

fn week_to_db(week: Week) -> Result<i32> {
    i32::try_from(week).map_err(|_| StandingsError::input(format!("week {} is out of range", week)))
}

fn week_from_db(week: i32) -> Result<Week> {
    Week::try_from(week).map_err(|_| StandingsError::input(format!("stored week {} is negative", week)))
}

/// Inclusive week bounds for a `BETWEEN` filter
fn week_bounds(range: WeekRange) -> Result<(i32, i32)> {
    match range {
        WeekRange::Only(week) => {
            let week = week_to_db(week)?;
            Ok((week, week))
        }
        WeekRange::Through(week) => Ok((0, week_to_db(week)?)),
        WeekRange::All => Ok((0, i32::MAX)),
    }
}

#[derive(Debug, FromRow)]
struct GameRecord {
    game_id: i64,
    week: i32,
    kickoff: DateTime<Utc>,
    status: String,
    home_team_id: i64,
    visitor_team_id: i64,
    home_score: Option<i32>,
    visitor_score: Option<i32>,
    winner_team_id: Option<i64>,
}

impl GameRecord {
    fn into_game(self) -> Result<GameResult> {
        Ok(GameResult {
            game_id: self.game_id,
            week: week_from_db(self.week)?,
            kickoff: self.kickoff,
            status: self.status.parse::<GameStatus>()?,
            home_team_id: self.home_team_id,
            visitor_team_id: self.visitor_team_id,
            home_score: self.home_score,
            visitor_score: self.visitor_score,
            winner_team_id: self.winner_team_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct PickRecord {
    user_id: i64,
    game_id: i64,
    team_id: Option<i64>,
    points: i64,
}

#[derive(Debug, FromRow)]
struct TiebreakerRecord {
    user_id: i64,
    week: i32,
    predicted_score: i32,
}

#[derive(Debug, FromRow)]
struct SurvivorPickRecord {
    user_id: i64,
    week: i32,
    game_id: i64,
    team_id: Option<i64>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, FromRow)]
struct UserRecord {
    user_id: i64,
    user_name: String,
    first_name: String,
    team_name: Option<String>,
}

/// Fact reader over the pool's Postgres tables
#[derive(Debug, Clone)]
pub struct PgFactReader {
    pool: PgPool,
}

impl PgFactReader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FactReader for PgFactReader {
    async fn read_games(&self, weeks: WeekRange) -> Result<Vec<GameResult>> {
        let (from, to) = week_bounds(weeks)?;
        let records = sqlx::query_as::<_, GameRecord>(
            "SELECT game_id, week, kickoff, status, home_team_id, visitor_team_id, \
                    home_score, visitor_score, winner_team_id \
             FROM games WHERE week BETWEEN $1 AND $2 ORDER BY week, kickoff, game_id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        records.into_iter().map(GameRecord::into_game).collect()
    }

    async fn read_picks(&self, weeks: WeekRange) -> Result<Vec<Pick>> {
        let (from, to) = week_bounds(weeks)?;
        // Picks on unknown games are returned so the engine can reject them
        let records = sqlx::query_as::<_, PickRecord>(
            "SELECT p.user_id, p.game_id, p.team_id, p.points \
             FROM picks p LEFT JOIN games g ON g.game_id = p.game_id \
             WHERE g.game_id IS NULL OR g.week BETWEEN $1 AND $2 \
             ORDER BY p.user_id, p.game_id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        Ok(records
            .into_iter()
            .map(|r| Pick { user_id: r.user_id, game_id: r.game_id, team_id: r.team_id, points: r.points })
            .collect())
    }

    async fn read_tiebreakers(&self, week: Week) -> Result<Vec<TiebreakerEntry>> {
        let records = sqlx::query_as::<_, TiebreakerRecord>(
            "SELECT user_id, week, predicted_score FROM tiebreakers WHERE week = $1 ORDER BY user_id",
        )
        .bind(week_to_db(week)?)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        records
            .into_iter()
            .map(|r| {
                Ok(TiebreakerEntry {
                    user_id: r.user_id,
                    week: week_from_db(r.week)?,
                    predicted_score: r.predicted_score,
                })
            })
            .collect()
    }

    async fn read_survivor_picks(&self, weeks: WeekRange) -> Result<Vec<SurvivorPick>> {
        let (from, to) = week_bounds(weeks)?;
        let records = sqlx::query_as::<_, SurvivorPickRecord>(
            "SELECT user_id, week, game_id, team_id, deleted_at FROM survivor_picks \
             WHERE week BETWEEN $1 AND $2 ORDER BY user_id, week, survivor_pick_id",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        records
            .into_iter()
            .map(|r| {
                Ok(SurvivorPick {
                    user_id: r.user_id,
                    week: week_from_db(r.week)?,
                    game_id: r.game_id,
                    team_id: r.team_id,
                    deleted_at: r.deleted_at,
                })
            })
            .collect()
    }

    async fn read_users(&self) -> Result<Vec<User>> {
        let records = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, user_name, first_name, team_name FROM users ORDER BY user_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(read_error)?;

        Ok(records
            .into_iter()
            .map(|r| User {
                user_id: r.user_id,
                user_name: r.user_name,
                first_name: r.first_name,
                team_name: r.team_name,
            })
            .collect())
    }

    async fn read_config(&self, name: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM system_values WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(read_error)
    }
}

#[derive(Debug, FromRow)]
struct StandingRecord {
    user_id: i64,
    user_name: String,
    team_name: String,
    rank: i32,
    tied: bool,
    is_eliminated: bool,
}

impl StandingRecord {
    fn entrant(&self) -> Entrant {
        Entrant { user_id: self.user_id, user_name: self.user_name.clone(), team_name: self.team_name.clone() }
    }

    fn rank<R>(&self, row: R) -> Result<Ranked<R>> {
        let rank = u32::try_from(self.rank).ok().filter(|r| *r > 0).ok_or_else(|| {
            StandingsError::persistence(format!("stored rank {} for user {} is not positive", self.rank, self.user_id))
        })?;
        Ok(Ranked { rank, tied: self.tied, is_eliminated: self.is_eliminated, row })
    }
}

#[derive(Debug, FromRow)]
struct ScoreRecord {
    points_earned: i64,
    points_wrong: i64,
    points_possible: i64,
    points_total: i64,
    games_correct: i64,
    games_wrong: i64,
    games_possible: i64,
    games_total: i64,
    games_missed: i64,
}

impl ScoreRecord {
    fn into_score(self) -> ScoreLine {
        ScoreLine {
            points_earned: self.points_earned,
            points_wrong: self.points_wrong,
            points_possible: self.points_possible,
            points_total: self.points_total,
            games_correct: self.games_correct,
            games_wrong: self.games_wrong,
            games_possible: self.games_possible,
            games_total: self.games_total,
            games_missed: self.games_missed,
        }
    }
}

#[derive(Debug, FromRow)]
struct WeeklyRecord {
    week: i32,
    #[sqlx(flatten)]
    standing: StandingRecord,
    #[sqlx(flatten)]
    score: ScoreRecord,
    tiebreaker_score: Option<i32>,
    last_score: Option<i32>,
    tiebreaker_is_under: Option<bool>,
    tiebreaker_absolute_diff: Option<i64>,
}

impl WeeklyRecord {
    fn into_ranked(self) -> Result<Ranked<WeeklyRow>> {
        let row = WeeklyRow {
            week: week_from_db(self.week)?,
            entrant: self.standing.entrant(),
            score: self.score.into_score(),
            tiebreaker: TiebreakerLine {
                tiebreaker_score: self.tiebreaker_score,
                last_score: self.last_score,
                is_under: self.tiebreaker_is_under,
                absolute_diff: self.tiebreaker_absolute_diff,
            },
        };
        self.standing.rank(row)
    }
}

#[derive(Debug, FromRow)]
struct OverallRecord {
    through_week: i32,
    #[sqlx(flatten)]
    standing: StandingRecord,
    #[sqlx(flatten)]
    score: ScoreRecord,
}

impl OverallRecord {
    fn into_ranked(self) -> Result<Ranked<OverallRow>> {
        let row = OverallRow {
            through_week: week_from_db(self.through_week)?,
            entrant: self.standing.entrant(),
            score: self.score.into_score(),
        };
        self.standing.rank(row)
    }
}

#[derive(Debug, FromRow)]
struct SurvivorRecord {
    week: i32,
    #[sqlx(flatten)]
    standing: StandingRecord,
    weeks_alive: i64,
    is_alive_overall: bool,
    current_status: Option<String>,
    last_pick: Option<i64>,
}

impl SurvivorRecord {
    fn into_ranked(self) -> Result<Ranked<SurvivorRow>> {
        let row = SurvivorRow {
            week: week_from_db(self.week)?,
            entrant: self.standing.entrant(),
            weeks_alive: self.weeks_alive,
            is_alive_overall: self.is_alive_overall,
            current_status: self.current_status.as_deref().map(str::parse::<SurvivorStatus>).transpose()?,
            last_pick: self.last_pick,
        };
        self.standing.rank(row)
    }
}

const WEEKLY_SELECT: &str = "SELECT week, user_id, user_name, team_name, rank, tied, is_eliminated, \
    points_earned, points_wrong, points_possible, points_total, \
    games_correct, games_wrong, games_possible, games_total, games_missed, \
    tiebreaker_score, last_score, tiebreaker_is_under, tiebreaker_absolute_diff \
    FROM weekly_leaderboard";

const WEEKLY_INSERT: &str = "INSERT INTO weekly_leaderboard (week, user_id, position, user_name, team_name, \
    rank, tied, is_eliminated, points_earned, points_wrong, points_possible, points_total, \
    games_correct, games_wrong, games_possible, games_total, games_missed, \
    tiebreaker_score, last_score, tiebreaker_is_under, tiebreaker_absolute_diff) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21)";

const OVERALL_INSERT: &str = "INSERT INTO overall_leaderboard (through_week, user_id, position, user_name, \
    team_name, rank, tied, is_eliminated, points_earned, points_wrong, points_possible, points_total, \
    games_correct, games_wrong, games_possible, games_total, games_missed) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)";

const SURVIVOR_INSERT: &str = "INSERT INTO survivor_leaderboard (week, user_id, position, user_name, team_name, \
    rank, tied, is_eliminated, weeks_alive, is_alive_overall, current_status, last_pick) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Binds user_id, position, user_name, team_name, rank, tied, is_eliminated
fn bind_standing<'q, R: MetricRow>(query: PgQuery<'q>, position: usize, ranked: &Ranked<R>) -> Result<PgQuery<'q>> {
    let entrant = ranked.row.entrant();
    let position = i32::try_from(position)
        .map_err(|_| StandingsError::persistence(format!("board position {} is out of range", position)))?;
    let rank = i32::try_from(ranked.rank)
        .map_err(|_| StandingsError::persistence(format!("rank {} is out of range", ranked.rank)))?;

    Ok(query
        .bind(entrant.user_id)
        .bind(position)
        .bind(entrant.user_name.clone())
        .bind(entrant.team_name.clone())
        .bind(rank)
        .bind(ranked.tied)
        .bind(ranked.is_eliminated))
}

fn bind_score<'q>(query: PgQuery<'q>, score: &ScoreLine) -> PgQuery<'q> {
    query
        .bind(score.points_earned)
        .bind(score.points_wrong)
        .bind(score.points_possible)
        .bind(score.points_total)
        .bind(score.games_correct)
        .bind(score.games_wrong)
        .bind(score.games_possible)
        .bind(score.games_total)
        .bind(score.games_missed)
}

/// Leaderboard store over the three leaderboard tables.
///
/// Weekly boards are replaced per week; the Overall and Survivor tables hold one board each
/// and are replaced whole.
#[derive(Debug, Clone)]
pub struct PgLeaderboardStore {
    pool: PgPool,
}

impl PgLeaderboardStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_weekly(&self, week: Week) -> Result<Vec<Ranked<WeeklyRow>>> {
        let sql = format!("{} WHERE week = $1 ORDER BY position", WEEKLY_SELECT);
        let records = sqlx::query_as::<_, WeeklyRecord>(&sql)
            .bind(week_to_db(week)?)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        records.into_iter().map(WeeklyRecord::into_ranked).collect()
    }

    async fn load_overall(&self) -> Result<Vec<Ranked<OverallRow>>> {
        let records = sqlx::query_as::<_, OverallRecord>(
            "SELECT through_week, user_id, user_name, team_name, rank, tied, is_eliminated, \
                    points_earned, points_wrong, points_possible, points_total, \
                    games_correct, games_wrong, games_possible, games_total, games_missed \
             FROM overall_leaderboard ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        records.into_iter().map(OverallRecord::into_ranked).collect()
    }

    async fn load_survivor(&self) -> Result<Vec<Ranked<SurvivorRow>>> {
        let records = sqlx::query_as::<_, SurvivorRecord>(
            "SELECT week, user_id, user_name, team_name, rank, tied, is_eliminated, \
                    weeks_alive, is_alive_overall, current_status, last_pick \
             FROM survivor_leaderboard ORDER BY position",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        records.into_iter().map(SurvivorRecord::into_ranked).collect()
    }
}

#[async_trait]
impl LeaderboardStore for PgLeaderboardStore {
    async fn replace(&self, board: &Leaderboard) -> Result<()> {
        // Dropping an uncommitted transaction rolls it back
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        match board {
            Leaderboard::Weekly { week, rows } => {
                let week = week_to_db(*week)?;
                sqlx::query("DELETE FROM weekly_leaderboard WHERE week = $1")
                    .bind(week)
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error)?;

                for (position, ranked) in rows.iter().enumerate() {
                    let query = bind_standing(sqlx::query(WEEKLY_INSERT).bind(week), position, ranked)?;
                    let tiebreaker = &ranked.row.tiebreaker;
                    bind_score(query, &ranked.row.score)
                        .bind(tiebreaker.tiebreaker_score)
                        .bind(tiebreaker.last_score)
                        .bind(tiebreaker.is_under)
                        .bind(tiebreaker.absolute_diff)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                }
            }
            Leaderboard::Overall { through_week, rows } => {
                let through_week = week_to_db(*through_week)?;
                sqlx::query("DELETE FROM overall_leaderboard")
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error)?;

                for (position, ranked) in rows.iter().enumerate() {
                    let query =
                        bind_standing(sqlx::query(OVERALL_INSERT).bind(through_week), position, ranked)?;
                    bind_score(query, &ranked.row.score)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                }
            }
            Leaderboard::Survivor { week, rows } => {
                let week = week_to_db(*week)?;
                sqlx::query("DELETE FROM survivor_leaderboard")
                    .execute(&mut *tx)
                    .await
                    .map_err(store_error)?;

                for (position, ranked) in rows.iter().enumerate() {
                    let query = bind_standing(sqlx::query(SURVIVOR_INSERT).bind(week), position, ranked)?;
                    query
                        .bind(ranked.row.weeks_alive)
                        .bind(ranked.row.is_alive_overall)
                        .bind(ranked.row.current_status.map(|s| s.to_string()))
                        .bind(ranked.row.last_pick)
                        .execute(&mut *tx)
                        .await
                        .map_err(store_error)?;
                }
            }
        }

        tx.commit().await.map_err(store_error)?;

        debug!(kind = %board.kind(), week = board.week(), rows = board.len(), "Replaced leaderboard table rows");
        Ok(())
    }

    async fn load_weekly_rows(&self, through_week: Week) -> Result<Vec<WeeklyRow>> {
        let sql = format!("{} WHERE week <= $1 ORDER BY week, position", WEEKLY_SELECT);
        let records = sqlx::query_as::<_, WeeklyRecord>(&sql)
            .bind(week_to_db(through_week)?)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        records.into_iter().map(|r| r.into_ranked().map(|ranked| ranked.row)).collect()
    }

    async fn load(&self, key: SnapshotKey) -> Result<Option<Leaderboard>> {
        let board = match key.kind {
            LeaderboardKind::Weekly => {
                let week = key
                    .week
                    .ok_or_else(|| StandingsError::input("a weekly snapshot key needs a week"))?;
                let rows = self.load_weekly(week).await?;
                (!rows.is_empty()).then(|| Leaderboard::Weekly { week, rows })
            }
            LeaderboardKind::Overall => {
                let rows = self.load_overall().await?;
                let through_week = rows.first().map(|r| r.row.through_week);
                through_week.map(|through_week| Leaderboard::Overall { through_week, rows })
            }
            LeaderboardKind::Survivor => {
                let rows = self.load_survivor().await?;
                let week = rows.first().map(|r| r.row.week);
                week.map(|week| Leaderboard::Survivor { week, rows })
            }
        };
        Ok(board)
    }
}
