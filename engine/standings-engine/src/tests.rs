//! Cross-module tests for the standings pipeline

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use crate::config::{EngineConfig, OverallSource};
use crate::engine::{build_overall, build_weekly, StandingsEngine};
use crate::error::{Result, StandingsError};
use crate::facts::{FactSnapshot, InMemoryFacts};
use crate::store::{InMemoryLeaderboardStore, LeaderboardStore};
use crate::types::*;
use crate::FromPicks;

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 9, day, hour, 0, 0).unwrap()
}

fn final_game(game_id: GameId, week: Week, kickoff: DateTime<Utc>, home: (TeamId, i32), visitor: (TeamId, i32)) -> GameResult {
    let winner = if home.1 > visitor.1 { home.0 } else { visitor.0 };
    GameResult {
        game_id,
        week,
        kickoff,
        status: GameStatus::Final,
        home_team_id: home.0,
        visitor_team_id: visitor.0,
        home_score: Some(home.1),
        visitor_score: Some(visitor.1),
        winner_team_id: Some(winner),
    }
}

fn open_game(game_id: GameId, week: Week, kickoff: DateTime<Utc>, home: TeamId, visitor: TeamId, status: GameStatus) -> GameResult {
    GameResult {
        game_id,
        week,
        kickoff,
        status,
        home_team_id: home,
        visitor_team_id: visitor,
        home_score: None,
        visitor_score: None,
        winner_team_id: None,
    }
}

fn pick(user_id: UserId, game_id: GameId, team_id: Option<TeamId>, points: i64) -> Pick {
    Pick { user_id, game_id, team_id, points }
}

fn survivor(user_id: UserId, week: Week, game_id: GameId, team_id: TeamId) -> SurvivorPick {
    SurvivorPick { user_id, week, game_id, team_id: Some(team_id), deleted_at: None }
}

fn user(user_id: UserId, user_name: &str, first_name: &str, team_name: Option<&str>) -> User {
    User {
        user_id,
        user_name: user_name.to_string(),
        first_name: first_name.to_string(),
        team_name: team_name.map(str::to_string),
    }
}

/// Three users over three weeks.
///
/// Week 1 (3 games, all final, last game 50-60 ends 21-24): users 1 and 2 both score 5
/// with two correct, user 3 scores 1. Week 2 (2 games, the later one in progress): user 3
/// leaves game 5 empty and has no tiebreaker. Week 3 is unplayed.
pub(crate) fn season_facts() -> InMemoryFacts {
    let mut facts = InMemoryFacts::new();
    facts.games = vec![
        final_game(1, 1, at(8, 13), (10, 24), (20, 17)),
        final_game(2, 1, at(8, 16), (30, 10), (40, 20)),
        final_game(3, 1, at(8, 20), (50, 21), (60, 24)),
        final_game(4, 2, at(15, 13), (10, 14), (30, 7)),
        open_game(5, 2, at(15, 20), 20, 40, GameStatus::InProgress),
        open_game(6, 3, at(22, 13), 50, 10, GameStatus::Scheduled),
        open_game(7, 3, at(22, 20), 60, 20, GameStatus::Scheduled),
    ];
    facts.picks = vec![
        pick(1, 1, Some(10), 3),
        pick(1, 2, Some(40), 2),
        pick(1, 3, Some(50), 1),
        pick(2, 1, Some(10), 2),
        pick(2, 2, Some(40), 3),
        pick(2, 3, Some(50), 1),
        pick(3, 1, Some(20), 3),
        pick(3, 2, Some(30), 2),
        pick(3, 3, Some(60), 1),
        pick(1, 4, Some(10), 2),
        pick(1, 5, Some(20), 1),
        pick(2, 4, Some(30), 2),
        pick(2, 5, Some(40), 1),
        pick(3, 4, Some(10), 1),
        pick(3, 5, None, 2),
    ];
    facts.tiebreakers = vec![
        TiebreakerEntry { user_id: 1, week: 1, predicted_score: 44 },
        TiebreakerEntry { user_id: 2, week: 1, predicted_score: 50 },
        TiebreakerEntry { user_id: 3, week: 1, predicted_score: 45 },
        TiebreakerEntry { user_id: 1, week: 2, predicted_score: 30 },
        TiebreakerEntry { user_id: 2, week: 2, predicted_score: 40 },
    ];
    facts.survivor_picks = vec![
        survivor(1, 1, 1, 10),
        survivor(1, 2, 4, 10),
        survivor(2, 1, 2, 40),
        survivor(2, 2, 4, 30),
        survivor(3, 1, 3, 60),
        survivor(3, 2, 5, 20),
    ];
    facts.users = vec![
        user(1, "alice", "Alice", Some("Blitz")),
        user(2, "bob", "Bob", None),
        user(3, "cara", "Cara", Some("")),
    ];
    facts.config.insert("PaymentDueWeek".to_string(), "1".to_string());
    facts
}

fn engine_with(facts: InMemoryFacts) -> StandingsEngine<InMemoryFacts, InMemoryLeaderboardStore> {
    StandingsEngine::new(EngineConfig::default(), facts, InMemoryLeaderboardStore::new()).unwrap()
}

/// (user, rank, tied, eliminated) in board order
fn summary<R: MetricRow>(rows: &[Ranked<R>]) -> Vec<(UserId, u32, bool, bool)> {
    rows.iter().map(|r| (r.row.user_id(), r.rank, r.tied, r.is_eliminated)).collect()
}

fn weekly_rows(board: Leaderboard) -> Vec<Ranked<WeeklyRow>> {
    match board {
        Leaderboard::Weekly { rows, .. } => rows,
        other => panic!("expected a weekly board, got {:?}", other.kind()),
    }
}

fn overall_rows(board: Leaderboard) -> Vec<Ranked<OverallRow>> {
    match board {
        Leaderboard::Overall { rows, .. } => rows,
        other => panic!("expected an overall board, got {:?}", other.kind()),
    }
}

fn survivor_rows(board: Leaderboard) -> Vec<Ranked<SurvivorRow>> {
    match board {
        Leaderboard::Survivor { rows, .. } => rows,
        other => panic!("expected a survivor board, got {:?}", other.kind()),
    }
}

#[tokio::test]
async fn test_weekly_tie_ignores_resolved_tiebreaker() {
    let engine = engine_with(season_facts());
    engine.run_weekly(1).await.unwrap();

    let board = engine.store().load(SnapshotKey::weekly(1)).await.unwrap().unwrap();
    let rows = weekly_rows(board);

    // User 1 is under and closer, so sorts first, but both share rank 1
    assert_eq!(summary(&rows), vec![(1, 1, true, false), (2, 1, true, false), (3, 2, false, true)]);

    let first = &rows[0].row;
    assert_eq!(first.entrant.team_name, "Blitz");
    assert_eq!(first.tiebreaker, TiebreakerLine::new(Some(44), Some(45)));
    assert_eq!(first.tiebreaker.absolute_diff, Some(1));
    assert_eq!(
        first.score,
        ScoreLine {
            points_earned: 5,
            points_wrong: 1,
            points_possible: 5,
            points_total: 6,
            games_correct: 2,
            games_wrong: 1,
            games_possible: 2,
            games_total: 3,
            games_missed: 0,
        }
    );
    assert_eq!(rows[1].row.entrant.team_name, "Bob's team");
    assert_eq!(rows[2].row.entrant.team_name, "Cara's team");
}

#[tokio::test]
async fn test_weekly_tie_with_open_last_game() {
    let mut facts = season_facts();
    facts.games.push(open_game(8, 1, at(9, 20), 70, 80, GameStatus::Scheduled));
    let board = engine_with(facts).compute_weekly(1).await.unwrap();
    let rows = weekly_rows(board);

    assert_eq!(summary(&rows), vec![(1, 1, true, false), (2, 1, true, false), (3, 2, false, false)]);
    assert!(rows.iter().all(|r| r.row.tiebreaker.last_score.is_none()));
    assert!(rows.iter().all(|r| r.row.tiebreaker.is_under.is_none()));
    assert_eq!(rows[0].row.score.points_total, 10);
}

#[tokio::test]
async fn test_weekly_in_progress_week() {
    let board = engine_with(season_facts()).compute_weekly(2).await.unwrap();
    let rows = weekly_rows(board);

    assert_eq!(summary(&rows), vec![(1, 1, false, false), (3, 2, false, false), (2, 3, false, true)]);

    let third = &rows[1].row;
    assert_eq!(third.tiebreaker, TiebreakerLine::default());
    assert_eq!(third.score.games_missed, 1);
    assert_eq!(third.score.games_possible, 2);
    assert_eq!(rows[2].row.score.points_possible, 1);
}

#[tokio::test]
async fn test_missed_games_follow_payment_due_week() {
    let missed = |facts: InMemoryFacts| async move {
        let rows = weekly_rows(engine_with(facts).compute_weekly(2).await.unwrap());
        rows.iter().map(|r| r.row.score.games_missed).sum::<i64>()
    };

    assert_eq!(missed(season_facts()).await, 1);

    let mut due_now = season_facts();
    due_now.config.insert("PaymentDueWeek".to_string(), "2".to_string());
    assert_eq!(missed(due_now).await, 0);

    let mut unset = season_facts();
    unset.config.clear();
    assert_eq!(missed(unset).await, 0);
}

#[tokio::test]
async fn test_overall_through_week_two() {
    let board = engine_with(season_facts()).compute_overall(2, OverallSource::Picks).await.unwrap();
    let rows = overall_rows(board);

    // Season ceiling 12: user 3 can still reach exactly the leader's 7, which is not enough to eliminate
    assert_eq!(summary(&rows), vec![(1, 1, false, false), (2, 2, false, false), (3, 3, false, false)]);

    let lines: Vec<_> = rows
        .iter()
        .map(|r| (r.row.score.points_earned, r.row.score.points_wrong, r.row.score.points_possible))
        .collect();
    assert_eq!(lines, vec![(7, 1, 8), (5, 3, 6), (2, 5, 4)]);
    assert!(rows.iter().all(|r| r.row.score.points_total == 9 && r.row.score.games_total == 5));
}

#[tokio::test]
async fn test_overall_paths_agree() {
    let engine = engine_with(season_facts());
    engine.run_weekly(1).await.unwrap();
    engine.run_weekly(2).await.unwrap();

    let from_picks = engine.compute_overall(2, OverallSource::Picks).await.unwrap();
    let from_weekly = engine.compute_overall(2, OverallSource::WeeklyRows).await.unwrap();
    assert_eq!(from_picks, from_weekly);

    // Weeks beyond the target are ignored by the fold
    let week_one = engine.compute_overall(1, OverallSource::WeeklyRows).await.unwrap();
    assert_eq!(week_one, engine.compute_overall(1, OverallSource::Picks).await.unwrap());
}

#[tokio::test]
async fn test_survivor_week_two() {
    let board = engine_with(season_facts()).compute_survivor(2).await.unwrap();
    let rows = survivor_rows(board);

    assert_eq!(summary(&rows), vec![(1, 1, true, false), (3, 1, true, false), (2, 2, false, true)]);

    let states: Vec<_> = rows.iter().map(|r| (r.row.current_status, r.row.last_pick, r.row.weeks_alive)).collect();
    assert_eq!(
        states,
        vec![
            (Some(SurvivorStatus::Alive), Some(10), 2),
            (Some(SurvivorStatus::Waiting), Some(20), 2),
            (Some(SurvivorStatus::Dead), Some(30), 2),
        ]
    );
}

#[tokio::test]
async fn test_survivor_loss_is_permanent() {
    let mut facts = season_facts();
    facts.games[5] = final_game(6, 3, at(22, 13), (50, 27), (10, 3));
    facts.survivor_picks.push(survivor(2, 3, 6, 50));

    let rows = survivor_rows(engine_with(facts).compute_survivor(3).await.unwrap());
    let bob = rows.iter().find(|r| r.row.user_id() == 2).unwrap();

    assert!(!bob.row.is_alive_overall);
    assert!(bob.is_eliminated);
    assert_eq!(bob.row.current_status, Some(SurvivorStatus::Alive));
    assert_eq!(bob.row.weeks_alive, 3);
    assert_eq!(bob.rank, 1);

    // Users 1 and 3 made no week 3 pick
    let others: Vec<_> = rows.iter().filter(|r| r.row.user_id() != 2).collect();
    assert!(others.iter().all(|r| r.rank == 2 && r.tied && r.row.current_status == Some(SurvivorStatus::Dead)));
}

/// Nine final week-1 games worth 1..=9 points plus four unplayed games in weeks 2-4,
/// for a season ceiling of 45 + 3 + 1 + 1 = 50
fn elimination_facts() -> FactSnapshot {
    let mut games: Vec<GameResult> = (1..=9)
        .map(|id| final_game(id, 1, at(8, id as u32), (100 + id, 1), (200 + id, 0)))
        .collect();
    games.push(open_game(10, 2, at(15, 13), 110, 210, GameStatus::Scheduled));
    games.push(open_game(11, 2, at(15, 16), 111, 211, GameStatus::Scheduled));
    games.push(open_game(12, 3, at(22, 13), 112, 212, GameStatus::Scheduled));
    games.push(open_game(13, 4, at(29, 13), 113, 213, GameStatus::Scheduled));

    fn side(id: GameId, wrong: &[GameId]) -> TeamId {
        if wrong.contains(&id) {
            200 + id
        } else {
            100 + id
        }
    }
    let mut picks: Vec<Pick> = (1..=9).map(|id| pick(1, id, Some(side(id, &[5])), id)).collect();
    picks.extend((1..=9).map(|id| pick(2, id, Some(side(id, &[6, 9])), id)));

    FactSnapshot {
        games,
        picks,
        users: vec![user(1, "lead", "Lea", None), user(2, "yann", "Yann", None)],
        ..Default::default()
    }
}

#[test]
fn test_overall_elimination_against_season_ceiling() {
    let rows = overall_rows(build_overall(&elimination_facts(), 1, &FromPicks).unwrap());

    assert_eq!(summary(&rows), vec![(1, 1, false, false), (2, 2, false, true)]);
    assert_eq!(rows[0].row.score.points_earned, 40);
    assert_eq!(rows[1].row.score.points_wrong, 15);
    assert_eq!(rows[1].row.score.points_total, 45);
}

#[tokio::test]
async fn test_reruns_are_idempotent() {
    let engine = engine_with(season_facts());

    for week in [1, 2] {
        engine.run_weekly(week).await.unwrap();
        let first = engine.store().load(SnapshotKey::weekly(week)).await.unwrap();
        engine.run_weekly(week).await.unwrap();
        let second = engine.store().load(SnapshotKey::weekly(week)).await.unwrap();
        assert_eq!(first, second);
    }

    let first = engine.compute_overall(2, OverallSource::Picks).await.unwrap();
    let second = engine.compute_overall(2, OverallSource::Picks).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_failed_run_keeps_previous_snapshot() {
    let good = engine_with(season_facts());
    good.run_weekly(1).await.unwrap();
    let before = good.store().load(SnapshotKey::weekly(1)).await.unwrap();

    let mut broken = season_facts();
    broken.picks.push(pick(1, 99, Some(10), 4));
    let bad = StandingsEngine::new(EngineConfig::default(), broken, good.store().clone()).unwrap();

    let result = bad.run_weekly(1).await;
    assert!(matches!(result, Err(StandingsError::InputInconsistency(_))));
    assert_eq!(good.store().load(SnapshotKey::weekly(1)).await.unwrap(), before);
}

#[tokio::test]
async fn test_required_tiebreaker_missing() {
    let config = EngineConfig { require_tiebreakers: true, ..Default::default() };
    let engine = StandingsEngine::new(config, season_facts(), InMemoryLeaderboardStore::new()).unwrap();

    assert!(engine.run_weekly(1).await.is_ok());
    assert!(matches!(engine.run_weekly(2).await, Err(StandingsError::InputInconsistency(_))));
    assert!(engine.store().load(SnapshotKey::weekly(2)).await.unwrap().is_none());
}

struct FailingStore;

#[async_trait]
impl LeaderboardStore for FailingStore {
    async fn replace(&self, _board: &Leaderboard) -> Result<()> {
        Err(StandingsError::persistence("connection reset during replace"))
    }

    async fn load_weekly_rows(&self, _through_week: Week) -> Result<Vec<WeeklyRow>> {
        Ok(Vec::new())
    }

    async fn load(&self, _key: SnapshotKey) -> Result<Option<Leaderboard>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_store_failure_propagates() {
    let engine = StandingsEngine::new(EngineConfig::default(), season_facts(), FailingStore).unwrap();
    let result = engine.run(&crate::RunRequest::all(1)).await;
    assert!(matches!(result, Err(StandingsError::Persistence(_))));
}

type WeekCase = (Vec<Option<bool>>, Vec<(Vec<i64>, Vec<Option<bool>>)>);

/// Per game: `Some(true)` home won / picked home, `None` undecided / no side.
/// Every user wagers a permutation of 1..=games.
fn week_case() -> impl Strategy<Value = WeekCase> {
    (1usize..7).prop_flat_map(|games| {
        let sides = || prop::collection::vec(prop::option::of(any::<bool>()), games);
        let points = Just((1..=games as i64).collect::<Vec<_>>()).prop_shuffle();
        (sides(), prop::collection::vec((points, sides()), 1..5))
    })
}

fn week_facts((winners, entries): &WeekCase) -> FactSnapshot {
    let team = |id: GameId, home: bool| if home { 100 + id } else { 200 + id };

    let games = winners
        .iter()
        .enumerate()
        .map(|(i, winner)| {
            let id = i as GameId + 1;
            let mut game = open_game(id, 1, at(8, i as u32 + 1), team(id, true), team(id, false), GameStatus::Scheduled);
            if let Some(home) = winner {
                game.status = GameStatus::Final;
                game.winner_team_id = Some(team(id, *home));
            }
            game
        })
        .collect();

    let mut picks = Vec::new();
    for (u, (points, sides)) in entries.iter().enumerate() {
        for (i, (wager, side)) in points.iter().zip(sides).enumerate() {
            let id = i as GameId + 1;
            picks.push(pick(u as UserId + 1, id, side.map(|home| team(id, home)), *wager));
        }
    }

    let users = (1..=entries.len() as UserId).map(|id| user(id, "player", "Pat", None)).collect();

    FactSnapshot { games, picks, users, ..Default::default() }
}

proptest! {
    #[test]
    fn prop_points_stay_under_ceiling(case in week_case()) {
        let facts = week_facts(&case);

        let weekly = weekly_rows(build_weekly(&facts, 1, &EngineConfig::default()).unwrap());
        for r in &weekly {
            let s = r.row.score;
            prop_assert!(s.points_earned <= s.points_possible);
            prop_assert!(s.points_possible <= s.points_total);
        }

        let overall = overall_rows(build_overall(&facts, 1, &FromPicks).unwrap());
        prop_assert_eq!(overall.len(), weekly.len());
        for o in &overall {
            let twin = weekly.iter().find(|w| w.row.user_id() == o.row.user_id()).unwrap();
            prop_assert_eq!(o.row.score, twin.row.score);
        }
    }
}
