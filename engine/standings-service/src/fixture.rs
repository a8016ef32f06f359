//! JSON fact fixtures for offline runs

use std::path::Path;

use standings_engine::InMemoryFacts;

use crate::error::Result;

/// Read a fact set from a JSON file.
///
/// Top-level keys are `games`, `picks`, `tiebreakers`, `survivor_picks`, `users`, and
/// `config` (system values such as `PaymentDueWeek`); missing keys default to empty.
pub fn load_fixture(path: &Path) -> Result<InMemoryFacts> {
    let raw = std::fs::read_to_string(path)?;
    let facts: InMemoryFacts = serde_json::from_str(&raw)?;

    tracing::debug!(
        path = %path.display(),
        games = facts.games.len(),
        picks = facts.picks.len(),
        users = facts.users.len(),
        "Loaded fact fixture"
    );

    Ok(facts)
}
