//! Error types for the standings engine

use thiserror::Error;

/// Result type alias for standings operations
pub type Result<T> = std::result::Result<T, StandingsError>;

/// Errors that can abort a standings run.
///
/// None of these are recovered inside the engine: a failed run never reaches the
/// replace step, so the previously persisted snapshot stays in place.
#[derive(Error, Debug)]
pub enum StandingsError {
    /// Facts reference something the fact set does not contain (unknown game,
    /// team, or user), or a required input is malformed
    #[error("Input inconsistency: {0}")]
    InputInconsistency(String),

    /// Aggregated rows break a structural invariant; indicates an aggregation bug
    #[error("Computation invariant violated: {0}")]
    InvariantViolation(String),

    /// The write-replace step failed
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// The fact reader could not supply facts
    #[error("Fact read failure: {0}")]
    FactRead(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StandingsError {
    /// Create a new input inconsistency error
    pub fn input(msg: impl Into<String>) -> Self {
        Self::InputInconsistency(msg.into())
    }

    /// Create a new invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a new persistence error
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new fact read error
    pub fn fact_read(msg: impl Into<String>) -> Self {
        Self::FactRead(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
