use thiserror::Error;

use crate::run::{RunId, RunState};

/// Errors from repository operations (used by trait definitions in skillrun-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    /// A compare-and-swap update found the row in a different state.
    #[error("stale write: expected '{expected}', found '{actual}'")]
    Stale { expected: String, actual: String },
}

/// Errors surfaced by the run subsystem.
///
/// `Unauthorized`, `InvalidReference` and `Backpressure` are returned to the
/// submitting caller. `StaleTransition` stays internal: workers discard the
/// run and move on. Execution outcomes are recorded on the run, never raised.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("not permitted to {action} this run")]
    Unauthorized { action: &'static str },

    #[error("invalid skill reference: {0}")]
    InvalidReference(String),

    #[error("run queue is full, retry later")]
    Backpressure,

    #[error("run {run_id} is '{actual}', expected '{expected}'")]
    StaleTransition {
        run_id: RunId,
        expected: RunState,
        actual: RunState,
    },

    #[error("run not found")]
    NotFound,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Errors related to skill authoring operations.
#[derive(Debug, Error)]
pub enum SkillError {
    #[error("skill not found")]
    NotFound,

    #[error("not permitted to {action} this skill")]
    Unauthorized { action: &'static str },

    #[error("skill '{0}' already exists")]
    NameConflict(String),

    #[error("invalid skill: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),
}
