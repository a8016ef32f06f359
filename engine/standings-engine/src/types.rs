//! Type definitions for facts, metric rows, and ranked leaderboards

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::StandingsError;

pub type UserId = i64;
pub type GameId = i64;
pub type TeamId = i64;
pub type Week = u32;

/// Lifecycle state of a scheduled game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameStatus {
    Scheduled,
    InProgress,
    Final,
    Postponed,
    Cancelled,
}

impl FromStr for GameStatus {
    type Err = StandingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "inprogress" | "in_progress" | "in progress" => Ok(Self::InProgress),
            "final" => Ok(Self::Final),
            "postponed" => Ok(Self::Postponed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(StandingsError::input(format!("unknown game status '{}'", other))),
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Scheduled => "Scheduled",
            Self::InProgress => "InProgress",
            Self::Final => "Final",
            Self::Postponed => "Postponed",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(s)
    }
}

/// A game on the schedule and whatever is known about its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub game_id: GameId,
    pub week: Week,
    pub kickoff: DateTime<Utc>,
    pub status: GameStatus,
    pub home_team_id: TeamId,
    pub visitor_team_id: TeamId,
    pub home_score: Option<i32>,
    pub visitor_score: Option<i32>,
    /// Unset until the game is decided
    pub winner_team_id: Option<TeamId>,
}

impl GameResult {
    /// Combined home + visitor score, only once the game is final
    pub fn final_combined_score(&self) -> Option<i32> {
        if self.status != GameStatus::Final {
            return None;
        }
        self.home_score?.checked_add(self.visitor_score?)
    }

    pub fn involves(&self, team_id: TeamId) -> bool {
        self.home_team_id == team_id || self.visitor_team_id == team_id
    }
}

/// A user's confidence pick for one game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pick {
    pub user_id: UserId,
    pub game_id: GameId,
    /// `None` means the user made no pick for this game
    pub team_id: Option<TeamId>,
    /// Points wagered on this pick
    pub points: i64,
}

/// Predicted combined score of the week's last game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiebreakerEntry {
    pub user_id: UserId,
    pub week: Week,
    pub predicted_score: i32,
}

/// A survivor-pool pick for one week
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivorPick {
    pub user_id: UserId,
    pub week: Week,
    pub game_id: GameId,
    pub team_id: Option<TeamId>,
    /// Soft-delete marker; deleted picks are kept for history but count as absent
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SurvivorPick {
    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }
}

/// Pool participant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub user_name: String,
    pub first_name: String,
    pub team_name: Option<String>,
}

impl User {
    /// Custom team name, or "<first name>'s team" when none is set
    pub fn display_team_name(&self) -> String {
        match self.team_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => format!("{}'s team", self.first_name),
        }
    }
}

/// The three leaderboard kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LeaderboardKind {
    Weekly,
    Overall,
    Survivor,
}

impl fmt::Display for LeaderboardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Weekly => "weekly",
            Self::Overall => "overall",
            Self::Survivor => "survivor",
        };
        f.write_str(s)
    }
}

impl FromStr for LeaderboardKind {
    type Err = StandingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "overall" | "season" => Ok(Self::Overall),
            "survivor" => Ok(Self::Survivor),
            other => Err(StandingsError::config(format!("unknown leaderboard kind '{}'", other))),
        }
    }
}

/// Week selection used when reading facts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeekRange {
    Only(Week),
    Through(Week),
    All,
}

impl WeekRange {
    pub fn contains(&self, week: Week) -> bool {
        match *self {
            Self::Only(w) => week == w,
            Self::Through(w) => week <= w,
            Self::All => true,
        }
    }
}

/// Identity and display fields shared by every leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entrant {
    pub user_id: UserId,
    pub user_name: String,
    pub team_name: String,
}

impl From<&User> for Entrant {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.user_id,
            user_name: user.user_name.clone(),
            team_name: user.display_team_name(),
        }
    }
}

/// Points and game counters for one user in one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreLine {
    pub points_earned: i64,
    pub points_wrong: i64,
    /// Schedule ceiling minus points already lost
    pub points_possible: i64,
    /// Schedule ceiling for the scope, independent of the user
    pub points_total: i64,
    pub games_correct: i64,
    pub games_wrong: i64,
    /// Games won plus games not yet decided
    pub games_possible: i64,
    pub games_total: i64,
    pub games_missed: i64,
}

impl ScoreLine {
    /// Component-wise sum of counters
    pub fn accumulate(&mut self, other: &ScoreLine) {
        self.points_earned += other.points_earned;
        self.points_wrong += other.points_wrong;
        self.points_possible += other.points_possible;
        self.points_total += other.points_total;
        self.games_correct += other.games_correct;
        self.games_wrong += other.games_wrong;
        self.games_possible += other.games_possible;
        self.games_total += other.games_total;
        self.games_missed += other.games_missed;
    }
}

/// Weekly tiebreaker state; the derived fields stay `None` while the week's last game is open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiebreakerLine {
    pub tiebreaker_score: Option<i32>,
    pub last_score: Option<i32>,
    pub is_under: Option<bool>,
    pub absolute_diff: Option<i64>,
}

impl TiebreakerLine {
    pub fn new(tiebreaker_score: Option<i32>, last_score: Option<i32>) -> Self {
        let (is_under, absolute_diff) = match (tiebreaker_score, last_score) {
            (Some(guess), Some(actual)) => {
                (Some(guess <= actual), Some((i64::from(guess) - i64::from(actual)).abs()))
            }
            _ => (None, None),
        };
        Self { tiebreaker_score, last_score, is_under, absolute_diff }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeeklyRow {
    pub week: Week,
    pub entrant: Entrant,
    pub score: ScoreLine,
    pub tiebreaker: TiebreakerLine,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallRow {
    pub through_week: Week,
    pub entrant: Entrant,
    pub score: ScoreLine,
}

/// Per-week survivor display state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurvivorStatus {
    Alive,
    Dead,
    Waiting,
}

impl fmt::Display for SurvivorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Alive => "Alive",
            Self::Dead => "Dead",
            Self::Waiting => "Waiting",
        };
        f.write_str(s)
    }
}

impl FromStr for SurvivorStatus {
    type Err = StandingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alive" => Ok(Self::Alive),
            "dead" => Ok(Self::Dead),
            "waiting" => Ok(Self::Waiting),
            other => Err(StandingsError::input(format!("unknown survivor status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurvivorRow {
    pub week: Week,
    pub entrant: Entrant,
    pub weeks_alive: i64,
    pub is_alive_overall: bool,
    /// `None` when the week's pick was soft-deleted
    pub current_status: Option<SurvivorStatus>,
    pub last_pick: Option<TeamId>,
}

/// Row access shared by the three metric row types
pub trait MetricRow {
    fn entrant(&self) -> &Entrant;

    fn user_id(&self) -> UserId {
        self.entrant().user_id
    }
}

impl MetricRow for WeeklyRow {
    fn entrant(&self) -> &Entrant {
        &self.entrant
    }
}

impl MetricRow for OverallRow {
    fn entrant(&self) -> &Entrant {
        &self.entrant
    }
}

impl MetricRow for SurvivorRow {
    fn entrant(&self) -> &Entrant {
        &self.entrant
    }
}

/// A metric row with its final rank, tie flag, and elimination flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranked<R> {
    /// 1-based dense rank
    pub rank: u32,
    pub tied: bool,
    pub is_eliminated: bool,
    #[serde(flatten)]
    pub row: R,
}

/// Identifies the unit a store replaces atomically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub kind: LeaderboardKind,
    /// Only weekly boards are kept per week
    pub week: Option<Week>,
}

impl SnapshotKey {
    pub fn weekly(week: Week) -> Self {
        Self { kind: LeaderboardKind::Weekly, week: Some(week) }
    }

    pub fn overall() -> Self {
        Self { kind: LeaderboardKind::Overall, week: None }
    }

    pub fn survivor() -> Self {
        Self { kind: LeaderboardKind::Survivor, week: None }
    }
}

/// A fully ranked board for one scope, ready to be persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Leaderboard {
    Weekly { week: Week, rows: Vec<Ranked<WeeklyRow>> },
    Overall { through_week: Week, rows: Vec<Ranked<OverallRow>> },
    Survivor { week: Week, rows: Vec<Ranked<SurvivorRow>> },
}

impl Leaderboard {
    pub fn kind(&self) -> LeaderboardKind {
        match self {
            Self::Weekly { .. } => LeaderboardKind::Weekly,
            Self::Overall { .. } => LeaderboardKind::Overall,
            Self::Survivor { .. } => LeaderboardKind::Survivor,
        }
    }

    pub fn week(&self) -> Week {
        match self {
            Self::Weekly { week, .. } | Self::Survivor { week, .. } => *week,
            Self::Overall { through_week, .. } => *through_week,
        }
    }

    pub fn key(&self) -> SnapshotKey {
        match self {
            Self::Weekly { week, .. } => SnapshotKey::weekly(*week),
            Self::Overall { .. } => SnapshotKey::overall(),
            Self::Survivor { .. } => SnapshotKey::survivor(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Weekly { rows, .. } => rows.len(),
            Self::Overall { rows, .. } => rows.len(),
            Self::Survivor { rows, .. } => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (tied rows, eliminated rows)
    pub fn flag_counts(&self) -> (usize, usize) {
        fn count<R>(rows: &[Ranked<R>]) -> (usize, usize) {
            rows.iter().fold((0, 0), |(t, e), r| {
                (t + usize::from(r.tied), e + usize::from(r.is_eliminated))
            })
        }
        match self {
            Self::Weekly { rows, .. } => count(rows),
            Self::Overall { rows, .. } => count(rows),
            Self::Survivor { rows, .. } => count(rows),
        }
    }
}
