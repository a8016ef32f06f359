//! # Ranking
//!
//! Dense ranking shared by all three leaderboards. A [`RankingPolicy`] supplies the
//! sort order (an ordered list of field/direction pairs) and the rank-defining key;
//! rows that sort apart but project to the same key share a rank.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::types::{MetricRow, OverallRow, Ranked, SurvivorRow, WeeklyRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// One comparator entry. `None` values sort last in either direction.
pub struct OrderBy<R> {
    pub field: &'static str,
    pub direction: Direction,
    pub value: fn(&R) -> Option<i64>,
}

/// Sort order plus rank-equality projection for one leaderboard kind
pub struct RankingPolicy<R: 'static, K> {
    pub name: &'static str,
    pub order: &'static [OrderBy<R>],
    pub rank_key: fn(&R) -> K,
    /// Final ordering among rows the comparator leaves equal
    pub stability: Option<fn(&R) -> i64>,
}

fn compare_values(a: Option<i64>, b: Option<i64>, direction: Direction) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => match direction {
            Direction::Asc => x.cmp(&y),
            Direction::Desc => y.cmp(&x),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl<R: 'static, K: PartialEq> RankingPolicy<R, K> {
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        self.order
            .iter()
            .map(|o| compare_values((o.value)(a), (o.value)(b), o.direction))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| match self.stability {
                Some(key) => key(a).cmp(&key(b)),
                None => Ordering::Equal,
            })
    }

    /// Sort, assign dense ranks, then flag ties
    pub fn rank(&self, mut rows: Vec<R>) -> Vec<Ranked<R>> {
        rows.sort_by(|a, b| self.compare(a, b));

        let ranks = dense_ranks(rows.iter().map(|r| (self.rank_key)(r)));
        let mut ranked: Vec<Ranked<R>> = rows
            .into_iter()
            .zip(ranks)
            .map(|(row, rank)| Ranked { rank, tied: false, is_eliminated: false, row })
            .collect();

        mark_ties(&mut ranked);

        tracing::debug!(policy = self.name, rows = ranked.len(), "Ranked rows");
        ranked
    }
}

/// Dense ranks for a pre-sorted key sequence.
///
/// Folds over the keys carrying the previous key and the next unused rank: an equal key
/// repeats the previous rank, a new key takes the next rank. Ranks start at 1.
pub fn dense_ranks<K: PartialEq>(keys: impl IntoIterator<Item = K>) -> Vec<u32> {
    let (ranks, _, _) = keys.into_iter().fold(
        (Vec::new(), None::<K>, 1u32),
        |(mut ranks, prev, next), key| {
            let rank = match (prev, ranks.last().copied()) {
                (Some(prev), Some(last)) if prev == key => last,
                _ => next,
            };
            ranks.push(rank);
            let next = if rank == next { next + 1 } else { next };
            (ranks, Some(key), next)
        },
    );
    ranks
}

/// Set `tied` on every row whose rank is shared with another row
pub fn mark_ties<R>(rows: &mut [Ranked<R>]) {
    let mut counts: HashMap<u32, usize> = HashMap::new();
    for row in rows.iter() {
        *counts.entry(row.rank).or_default() += 1;
    }
    for row in rows.iter_mut() {
        row.tied = counts.get(&row.rank).copied().unwrap_or(0) > 1;
    }
}

fn flag(value: bool) -> i64 {
    i64::from(value)
}

fn weekly_points_earned(r: &WeeklyRow) -> Option<i64> {
    Some(r.score.points_earned)
}

fn weekly_games_correct(r: &WeeklyRow) -> Option<i64> {
    Some(r.score.games_correct)
}

fn weekly_is_under(r: &WeeklyRow) -> Option<i64> {
    r.tiebreaker.is_under.map(flag)
}

fn weekly_absolute_diff(r: &WeeklyRow) -> Option<i64> {
    r.tiebreaker.absolute_diff
}

fn weekly_rank_key(r: &WeeklyRow) -> (i64, i64) {
    (r.score.points_earned, r.score.games_correct)
}

fn overall_points_earned(r: &OverallRow) -> Option<i64> {
    Some(r.score.points_earned)
}

fn overall_games_correct(r: &OverallRow) -> Option<i64> {
    Some(r.score.games_correct)
}

fn overall_rank_key(r: &OverallRow) -> (i64, i64) {
    (r.score.points_earned, r.score.games_correct)
}

fn survivor_is_alive(r: &SurvivorRow) -> Option<i64> {
    Some(flag(r.is_alive_overall))
}

fn survivor_weeks_alive(r: &SurvivorRow) -> Option<i64> {
    Some(r.weeks_alive)
}

fn survivor_rank_key(r: &SurvivorRow) -> (bool, i64) {
    (r.is_alive_overall, r.weeks_alive)
}

fn user_id_of<R: MetricRow>(r: &R) -> i64 {
    r.user_id()
}

/// Tiebreaker fields order equal-scoring rows but never split their rank
pub const WEEKLY_POLICY: RankingPolicy<WeeklyRow, (i64, i64)> = RankingPolicy {
    name: "weekly",
    order: &[
        OrderBy { field: "PointsEarned", direction: Direction::Desc, value: weekly_points_earned },
        OrderBy { field: "GamesCorrect", direction: Direction::Desc, value: weekly_games_correct },
        OrderBy { field: "TiebreakerIsUnder", direction: Direction::Desc, value: weekly_is_under },
        OrderBy { field: "TiebreakerAbsoluteDiff", direction: Direction::Asc, value: weekly_absolute_diff },
    ],
    rank_key: weekly_rank_key,
    stability: Some(user_id_of::<WeeklyRow>),
};

pub const OVERALL_POLICY: RankingPolicy<OverallRow, (i64, i64)> = RankingPolicy {
    name: "overall",
    order: &[
        OrderBy { field: "PointsEarned", direction: Direction::Desc, value: overall_points_earned },
        OrderBy { field: "GamesCorrect", direction: Direction::Desc, value: overall_games_correct },
    ],
    rank_key: overall_rank_key,
    stability: Some(user_id_of::<OverallRow>),
};

pub const SURVIVOR_POLICY: RankingPolicy<SurvivorRow, (bool, i64)> = RankingPolicy {
    name: "survivor",
    order: &[
        OrderBy { field: "IsAliveOverall", direction: Direction::Desc, value: survivor_is_alive },
        OrderBy { field: "WeeksAlive", direction: Direction::Desc, value: survivor_weeks_alive },
    ],
    rank_key: survivor_rank_key,
    stability: Some(user_id_of::<SurvivorRow>),
};
