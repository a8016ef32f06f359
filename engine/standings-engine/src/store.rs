//! Leaderboard store trait and the in-memory store

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::types::{Leaderboard, SnapshotKey, Week, WeeklyRow};

/// Destination for ranked leaderboards
#[async_trait]
pub trait LeaderboardStore: Send + Sync {
    /// Atomically discard the snapshot stored under `board.key()` and install `board`.
    ///
    /// Readers observe either the old snapshot or the new one, never a mix.
    async fn replace(&self, board: &Leaderboard) -> Result<()>;

    /// Persisted weekly rows for weeks 1..=`through_week`
    async fn load_weekly_rows(&self, through_week: Week) -> Result<Vec<WeeklyRow>>;

    /// The current snapshot stored under `key`
    async fn load(&self, key: SnapshotKey) -> Result<Option<Leaderboard>>;
}

/// Store backed by a map behind one async lock
#[derive(Debug, Clone, Default)]
pub struct InMemoryLeaderboardStore {
    boards: Arc<RwLock<HashMap<SnapshotKey, Leaderboard>>>,
}

impl InMemoryLeaderboardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored board, weekly boards first in week order
    pub async fn snapshots(&self) -> Vec<Leaderboard> {
        let boards = self.boards.read().await;
        let mut all: Vec<Leaderboard> = boards.values().cloned().collect();
        all.sort_by_key(|b| (b.kind(), b.week()));
        all
    }
}

#[async_trait]
impl LeaderboardStore for InMemoryLeaderboardStore {
    async fn replace(&self, board: &Leaderboard) -> Result<()> {
        let mut boards = self.boards.write().await;
        boards.insert(board.key(), board.clone());

        tracing::debug!(kind = %board.kind(), week = board.week(), rows = board.len(), "Replaced in-memory leaderboard");

        Ok(())
    }

    async fn load_weekly_rows(&self, through_week: Week) -> Result<Vec<WeeklyRow>> {
        let boards = self.boards.read().await;
        let mut weeks: Vec<(Week, &Leaderboard)> = boards
            .iter()
            .filter_map(|(key, board)| key.week.filter(|w| *w <= through_week).map(|w| (w, board)))
            .collect();
        weeks.sort_by_key(|(w, _)| *w);

        Ok(weeks
            .into_iter()
            .flat_map(|(_, board)| match board {
                Leaderboard::Weekly { rows, .. } => rows.iter().map(|r| r.row.clone()).collect::<Vec<_>>(),
                _ => Vec::new(),
            })
            .collect())
    }

    async fn load(&self, key: SnapshotKey) -> Result<Option<Leaderboard>> {
        Ok(self.boards.read().await.get(&key).cloned())
    }
}
