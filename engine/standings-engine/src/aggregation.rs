//! # Aggregation
//!
//! Folds raw pick and outcome facts into unranked metric rows, one per user per scope.
//! A user without any qualifying fact in scope gets no row at all.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::config::EngineConfig;
use crate::error::{Result, StandingsError};
use crate::facts::FactSnapshot;
use crate::types::{
    Entrant, GameId, GameResult, MetricRow, OverallRow, Pick, ScoreLine, SurvivorPick,
    SurvivorRow, SurvivorStatus, TeamId, TiebreakerLine, User, UserId, Week, WeekRange,
    WeeklyRow,
};

/// Maximum points in a week of `games` games, with picks weighted 1..=games
pub fn triangular(games: i64) -> i64 {
    games * (games + 1) / 2
}

/// Weekly maximum for every week in `weeks` that has games
fn week_ceilings(games: &[GameResult], weeks: WeekRange) -> BTreeMap<Week, i64> {
    let mut per_week: BTreeMap<Week, i64> = BTreeMap::new();
    for game in games.iter().filter(|g| weeks.contains(g.week)) {
        *per_week.entry(game.week).or_default() += 1;
    }
    per_week.into_iter().map(|(week, count)| (week, triangular(count))).collect()
}

/// Sum of the weekly maxima for every week in `weeks`
pub fn schedule_ceiling(games: &[GameResult], weeks: WeekRange) -> i64 {
    week_ceilings(games, weeks).values().sum()
}

/// Add one pick's contribution to a score line. Points fields that depend on the
/// schedule are filled in by [`finish_score`].
fn tally_pick(score: &mut ScoreLine, pick: &Pick, game: &GameResult, payment_due_week: Option<Week>) {
    score.games_total += 1;

    match (pick.team_id, game.winner_team_id) {
        (Some(team), Some(winner)) if team == winner => {
            score.points_earned += pick.points;
            score.games_correct += 1;
            score.games_possible += 1;
        }
        (Some(_), Some(_)) => {
            score.points_wrong += pick.points;
            score.games_wrong += 1;
        }
        // Undecided games are still winnable whether or not a side was chosen
        (_, None) => score.games_possible += 1,
        (None, Some(_)) => {}
    }

    if pick.team_id.is_none() && payment_due_week.is_some_and(|due| game.week > due) {
        score.games_missed += 1;
    }
}

fn finish_score(score: &mut ScoreLine, ceiling: i64) {
    score.points_total = ceiling;
    score.points_possible = ceiling - score.points_wrong;
}

fn entrant_for(users: &HashMap<UserId, &User>, user_id: UserId) -> Result<Entrant> {
    users
        .get(&user_id)
        .map(|u| Entrant::from(*u))
        .ok_or_else(|| StandingsError::input(format!("user {} is not a known pool member", user_id)))
}

/// Resolve a pick's game and check the chosen side actually plays in it
fn resolve_game<'a>(
    games: &HashMap<GameId, &'a GameResult>,
    user_id: UserId,
    game_id: GameId,
    team_id: Option<TeamId>,
) -> Result<&'a GameResult> {
    let game = games.get(&game_id).copied().ok_or_else(|| {
        StandingsError::input(format!("user {} picked game {} which is not on the schedule", user_id, game_id))
    })?;

    if let Some(team) = team_id {
        if !game.involves(team) {
            return Err(StandingsError::input(format!(
                "user {} picked team {} for game {} ({} vs {})",
                user_id, team, game_id, game.home_team_id, game.visitor_team_id
            )));
        }
    }

    Ok(game)
}

/// Group valid picks by user, keeping only games inside `weeks`.
///
/// Decided wagers for one user in one week may not exceed that week's maximum.
fn picks_by_user<'a>(
    facts: &'a FactSnapshot,
    games: &HashMap<GameId, &'a GameResult>,
    weeks: WeekRange,
) -> Result<BTreeMap<UserId, Vec<(&'a Pick, &'a GameResult)>>> {
    let mut grouped: BTreeMap<UserId, Vec<(&Pick, &GameResult)>> = BTreeMap::new();
    for pick in &facts.picks {
        if pick.points < 0 {
            return Err(StandingsError::input(format!(
                "user {} wagered negative points ({}) on game {}",
                pick.user_id, pick.points, pick.game_id
            )));
        }
        let game = resolve_game(games, pick.user_id, pick.game_id, pick.team_id)?;
        if !weeks.contains(game.week) {
            continue;
        }
        grouped.entry(pick.user_id).or_default().push((pick, game));
    }

    let ceilings = week_ceilings(&facts.games, weeks);
    for (user_id, picks) in &grouped {
        let mut decided: BTreeMap<Week, i64> = BTreeMap::new();
        for (pick, game) in picks {
            if pick.team_id.is_some() && game.winner_team_id.is_some() {
                *decided.entry(game.week).or_default() += pick.points;
            }
        }
        for (week, wagered) in decided {
            let ceiling = ceilings.get(&week).copied().unwrap_or_default();
            if wagered > ceiling {
                return Err(StandingsError::input(format!(
                    "user {} wagered {} decided points in week {}, above the week maximum of {}",
                    user_id, wagered, week, ceiling
                )));
            }
        }
    }

    Ok(grouped)
}

/// Combined score of the week's chronologically last game, once it is final
pub fn last_game_score(games: &[GameResult], week: Week) -> Option<i32> {
    games
        .iter()
        .filter(|g| g.week == week)
        .max_by_key(|g| (g.kickoff, g.game_id))
        .and_then(GameResult::final_combined_score)
}

/// Weekly metric rows for `week`
pub fn aggregate_weekly(facts: &FactSnapshot, week: Week, config: &EngineConfig) -> Result<Vec<WeeklyRow>> {
    let games = facts.games_by_id();
    let users = facts.users_by_id();
    let ceiling = schedule_ceiling(&facts.games, WeekRange::Only(week));
    let last_score = last_game_score(&facts.games, week);

    let mut tiebreakers: HashMap<UserId, i32> = HashMap::new();
    for entry in facts.tiebreakers.iter().filter(|t| t.week == week) {
        if tiebreakers.insert(entry.user_id, entry.predicted_score).is_some() {
            return Err(StandingsError::input(format!(
                "user {} has more than one tiebreaker for week {}",
                entry.user_id, week
            )));
        }
    }

    let mut rows = Vec::new();
    for (user_id, picks) in picks_by_user(facts, &games, WeekRange::Only(week))? {
        let entrant = entrant_for(&users, user_id)?;

        let mut score = ScoreLine::default();
        for (pick, game) in picks {
            tally_pick(&mut score, pick, game, facts.payment_due_week);
        }
        finish_score(&mut score, ceiling);

        let tiebreaker_score = tiebreakers.get(&user_id).copied();
        if tiebreaker_score.is_none() {
            if config.require_tiebreakers {
                return Err(StandingsError::input(format!(
                    "user {} has picks but no tiebreaker for week {}",
                    user_id, week
                )));
            }
            tracing::warn!(user_id, week, "No tiebreaker entry, ranking with an empty tiebreaker");
        }

        rows.push(WeeklyRow {
            week,
            entrant,
            score,
            tiebreaker: TiebreakerLine::new(tiebreaker_score, last_score),
        });
    }

    Ok(rows)
}

/// One way of producing Overall rows for weeks 1..=W
pub trait OverallAggregator {
    fn aggregate(&self, facts: &FactSnapshot, through_week: Week) -> Result<Vec<OverallRow>>;
}

/// Aggregates the season directly from picks
#[derive(Debug, Clone, Copy, Default)]
pub struct FromPicks;

impl OverallAggregator for FromPicks {
    fn aggregate(&self, facts: &FactSnapshot, through_week: Week) -> Result<Vec<OverallRow>> {
        let games = facts.games_by_id();
        let users = facts.users_by_id();
        let ceiling = schedule_ceiling(&facts.games, WeekRange::Through(through_week));

        let mut rows = Vec::new();
        for (user_id, picks) in picks_by_user(facts, &games, WeekRange::Through(through_week))? {
            let mut score = ScoreLine::default();
            for (pick, game) in picks {
                tally_pick(&mut score, pick, game, facts.payment_due_week);
            }
            finish_score(&mut score, ceiling);

            rows.push(OverallRow { through_week, entrant: entrant_for(&users, user_id)?, score });
        }

        Ok(rows)
    }
}

/// Folds already computed weekly rows into season rows.
///
/// The counters are summed; the two schedule-derived fields are recomputed from the
/// schedule so a user who sat out a whole week still gets the full ceiling.
#[derive(Debug, Clone, Copy)]
pub struct FromWeeklyRows<'a> {
    pub weekly_rows: &'a [WeeklyRow],
}

impl OverallAggregator for FromWeeklyRows<'_> {
    fn aggregate(&self, facts: &FactSnapshot, through_week: Week) -> Result<Vec<OverallRow>> {
        let ceiling = schedule_ceiling(&facts.games, WeekRange::Through(through_week));

        let mut seen: HashSet<(UserId, Week)> = HashSet::new();
        let mut folded: BTreeMap<UserId, (Week, Entrant, ScoreLine)> = BTreeMap::new();
        for row in self.weekly_rows.iter().filter(|r| r.week <= through_week) {
            if !seen.insert((row.user_id(), row.week)) {
                return Err(StandingsError::invariant(format!(
                    "duplicate weekly row for user {} in week {}",
                    row.user_id(),
                    row.week
                )));
            }

            let entry = folded
                .entry(row.user_id())
                .or_insert_with(|| (row.week, row.entrant.clone(), ScoreLine::default()));
            entry.2.accumulate(&row.score);
            // Display names follow the most recent week
            if row.week >= entry.0 {
                entry.0 = row.week;
                entry.1 = row.entrant.clone();
            }
        }

        Ok(folded
            .into_values()
            .map(|(_, entrant, mut score)| {
                finish_score(&mut score, ceiling);
                OverallRow { through_week, entrant, score }
            })
            .collect())
    }
}

/// Survivor rows for `week`: one per user with any survivor pick (deleted or not) so far
pub fn aggregate_survivor(facts: &FactSnapshot, week: Week) -> Result<Vec<SurvivorRow>> {
    let games = facts.games_by_id();
    let users = facts.users_by_id();

    let mut by_user: BTreeMap<UserId, Vec<(&SurvivorPick, &GameResult)>> = BTreeMap::new();
    for pick in facts.survivor_picks.iter().filter(|p| p.week <= week) {
        let game = resolve_game(&games, pick.user_id, pick.game_id, pick.team_id)?;
        by_user.entry(pick.user_id).or_default().push((pick, game));
    }

    let mut rows = Vec::new();
    for (user_id, picks) in by_user {
        let entrant = entrant_for(&users, user_id)?;

        let mut active: BTreeMap<Week, (&SurvivorPick, &GameResult)> = BTreeMap::new();
        let mut deleted_weeks: HashSet<Week> = HashSet::new();
        for (pick, game) in picks {
            if !pick.is_active() {
                deleted_weeks.insert(pick.week);
                continue;
            }
            if active.insert(pick.week, (pick, game)).is_some() {
                return Err(StandingsError::input(format!(
                    "user {} has more than one active survivor pick for week {}",
                    user_id, pick.week
                )));
            }
        }

        // A loss or an empty week anywhere up to now ends the run
        let is_alive_overall = (1..=week).all(|w| match active.get(&w) {
            Some((pick, game)) => match (pick.team_id, game.winner_team_id) {
                (Some(team), Some(winner)) => team == winner,
                (Some(_), None) => true,
                (None, _) => false,
            },
            None => false,
        });

        let current_status = match active.get(&week) {
            Some((pick, game)) => Some(match (pick.team_id, game.winner_team_id) {
                (None, _) => SurvivorStatus::Dead,
                (Some(_), None) => SurvivorStatus::Waiting,
                (Some(team), Some(winner)) if team == winner => SurvivorStatus::Alive,
                (Some(_), Some(_)) => SurvivorStatus::Dead,
            }),
            None if deleted_weeks.contains(&week) => None,
            None => Some(SurvivorStatus::Dead),
        };

        let weeks_alive = active.len() as i64;
        let last_pick = active.values().next_back().and_then(|(p, _)| p.team_id);

        rows.push(SurvivorRow { week, entrant, weeks_alive, is_alive_overall, current_status, last_pick });
    }

    Ok(rows)
}

/// Reject duplicate users within one scope
pub fn check_unique_users<R: MetricRow>(rows: &[R]) -> Result<()> {
    let mut seen = HashSet::with_capacity(rows.len());
    for row in rows {
        if !seen.insert(row.user_id()) {
            return Err(StandingsError::invariant(format!(
                "more than one row for user {} in the same scope",
                row.user_id()
            )));
        }
    }
    Ok(())
}

/// Structural checks on scored rows before they are ranked
pub fn check_score_invariants<R: MetricRow>(rows: &[R], score: impl Fn(&R) -> &ScoreLine) -> Result<()> {
    check_unique_users(rows)?;

    for row in rows {
        let s = score(row);
        if s.games_correct + s.games_wrong + s.games_missed > s.games_total {
            return Err(StandingsError::invariant(format!(
                "user {}: correct {} + wrong {} + missed {} exceeds total {}",
                row.user_id(),
                s.games_correct,
                s.games_wrong,
                s.games_missed,
                s.games_total
            )));
        }
        if s.points_earned > s.points_possible || s.points_possible > s.points_total {
            return Err(StandingsError::invariant(format!(
                "user {}: expected earned {} <= possible {} <= total {}",
                row.user_id(),
                s.points_earned,
                s.points_possible,
                s.points_total
            )));
        }
    }

    Ok(())
}
