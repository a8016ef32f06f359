//! # Elimination
//!
//! Flags ranked rows that can no longer catch the leader. Flags are recomputed from the
//! rows every time, so running the pass twice on the same board yields the same flags.

use crate::types::{OverallRow, Ranked, SurvivorRow, WeeklyRow};

/// Best and second-best earned points with the index holding the best
struct Leaders {
    best: Option<(usize, i64)>,
    runner_up: Option<i64>,
}

impl Leaders {
    fn scan<R>(rows: &[Ranked<R>], earned: impl Fn(&R) -> i64) -> Self {
        rows.iter().enumerate().fold(Self { best: None, runner_up: None }, |acc, (i, r)| {
            let points = earned(&r.row);
            match acc.best {
                Some((_, best)) if points <= best => Self {
                    best: acc.best,
                    runner_up: Some(acc.runner_up.map_or(points, |p| p.max(points))),
                },
                _ => Self { best: Some((i, points)), runner_up: acc.best.map(|(_, b)| b) },
            }
        })
    }

    /// Highest earned points among every row except `index`
    fn best_other(&self, index: usize) -> Option<i64> {
        match self.best {
            Some((i, _)) if i == index => self.runner_up,
            Some((_, best)) => Some(best),
            None => None,
        }
    }
}

/// Mark rows whose ceiling sits strictly below some other row's earned points
pub fn flag_unreachable<R>(
    rows: &mut [Ranked<R>],
    earned: impl Fn(&R) -> i64,
    ceiling: impl Fn(&R) -> i64,
) {
    let leaders = Leaders::scan(rows, earned);
    for (i, r) in rows.iter_mut().enumerate() {
        r.is_eliminated = leaders.best_other(i).is_some_and(|lead| lead > ceiling(&r.row));
    }
}

/// Weekly: another user already earned more than this user can still reach this week
pub fn eliminate_weekly(rows: &mut [Ranked<WeeklyRow>]) {
    flag_unreachable(rows, |r| r.score.points_earned, |r| r.score.points_possible);
}

/// Overall: the season ceiling minus points already lost cannot catch another user
pub fn eliminate_overall(rows: &mut [Ranked<OverallRow>], season_ceiling: i64) {
    flag_unreachable(rows, |r| r.score.points_earned, |r| season_ceiling - r.score.points_wrong);
}

/// Survivor: a broken chain is the elimination
pub fn eliminate_survivor(rows: &mut [Ranked<SurvivorRow>]) {
    for r in rows.iter_mut() {
        r.is_eliminated = !r.row.is_alive_overall;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entrant, ScoreLine, TiebreakerLine};

    fn entrant(user_id: i64) -> Entrant {
        Entrant { user_id, user_name: format!("u{}", user_id), team_name: format!("t{}", user_id) }
    }

    fn overall(user_id: i64, points_earned: i64, points_wrong: i64) -> Ranked<OverallRow> {
        Ranked {
            rank: 1,
            tied: false,
            is_eliminated: false,
            row: OverallRow {
                through_week: 5,
                entrant: entrant(user_id),
                score: ScoreLine { points_earned, points_wrong, ..Default::default() },
            },
        }
    }

    fn weekly(user_id: i64, points_earned: i64, points_possible: i64) -> Ranked<WeeklyRow> {
        Ranked {
            rank: 1,
            tied: false,
            is_eliminated: false,
            row: WeeklyRow {
                week: 1,
                entrant: entrant(user_id),
                score: ScoreLine { points_earned, points_possible, ..Default::default() },
                tiebreaker: TiebreakerLine::default(),
            },
        }
    }

    fn flags<R>(rows: &[Ranked<R>]) -> Vec<bool> {
        rows.iter().map(|r| r.is_eliminated).collect()
    }

    #[test]
    fn test_overall_elimination_against_season_ceiling() {
        // Ceiling 50: leader at 40, Y can still reach 35, Z can still reach 42
        let mut rows = vec![overall(1, 40, 5), overall(2, 20, 15), overall(3, 30, 8)];
        eliminate_overall(&mut rows, 50);
        assert_eq!(flags(&rows), vec![false, true, false]);
    }

    #[test]
    fn test_leader_compares_against_runner_up() {
        // The leader's own points never eliminate the leader
        let mut rows = vec![overall(1, 40, 45), overall(2, 4, 0)];
        eliminate_overall(&mut rows, 50);
        assert_eq!(flags(&rows), vec![false, false]);

        let mut rows = vec![overall(1, 40, 45), overall(2, 6, 0)];
        eliminate_overall(&mut rows, 50);
        assert_eq!(flags(&rows), vec![true, false]);
    }

    #[test]
    fn test_shared_lead_is_not_eliminated() {
        let mut rows = vec![overall(1, 30, 20), overall(2, 30, 20)];
        eliminate_overall(&mut rows, 50);
        assert_eq!(flags(&rows), vec![false, false]);
    }

    #[test]
    fn test_single_row_never_eliminated() {
        let mut rows = vec![weekly(1, 0, 0)];
        eliminate_weekly(&mut rows);
        assert_eq!(flags(&rows), vec![false]);

        let mut empty: Vec<Ranked<WeeklyRow>> = Vec::new();
        eliminate_weekly(&mut empty);
    }

    #[test]
    fn test_weekly_elimination_uses_points_possible() {
        let mut rows = vec![weekly(1, 5, 6), weekly(2, 2, 5), weekly(3, 1, 4)];
        eliminate_weekly(&mut rows);
        assert_eq!(flags(&rows), vec![false, false, true]);
    }

    #[test]
    fn test_elimination_is_idempotent() {
        let mut rows = vec![weekly(1, 5, 6), weekly(2, 2, 5), weekly(3, 1, 4)];
        eliminate_weekly(&mut rows);
        let first = flags(&rows);
        eliminate_weekly(&mut rows);
        assert_eq!(flags(&rows), first);
    }

    #[test]
    fn test_survivor_elimination_follows_alive_flag() {
        let row = |user_id, is_alive_overall| Ranked {
            rank: 1,
            tied: false,
            is_eliminated: false,
            row: SurvivorRow {
                week: 2,
                entrant: entrant(user_id),
                weeks_alive: 2,
                is_alive_overall,
                current_status: None,
                last_pick: None,
            },
        };
        let mut rows = vec![row(1, true), row(2, false)];
        eliminate_survivor(&mut rows);
        assert_eq!(flags(&rows), vec![false, true]);
    }
}
