//! Run record store trait definition.
//!
//! The run store is the single source of truth for what happened to a run.
//! Every state change goes through [`RunRepository::transition`], a
//! compare-and-swap on the current state: two workers racing to claim the
//! same run can never both succeed.

use chrono::{DateTime, Utc};
use serde_json::Value;
use skillrun_types::error::RepositoryError;
use skillrun_types::principal::PrincipalId;
use skillrun_types::run::{Run, RunFailure, RunId, RunState};
use skillrun_types::skill::SkillId;

/// A guarded state change.
///
/// Applies only when the run is currently in `from` (and, when `attempt` is
/// set, still carries that claim number). Otherwise the store answers
/// `RepositoryError::Stale`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: RunState,
    pub to: RunState,
    pub output: Option<Value>,
    pub error: Option<RunFailure>,
    pub attempt: Option<u32>,
}

impl Transition {
    /// `Queued -> Running`. The store stamps `started_at` and bumps `attempt`.
    pub fn claim() -> Self {
        Self {
            from: RunState::Queued,
            to: RunState::Running,
            output: None,
            error: None,
            attempt: None,
        }
    }

    pub fn succeed(attempt: u32, output: Value) -> Self {
        Self {
            from: RunState::Running,
            to: RunState::Succeeded,
            output: Some(output),
            error: None,
            attempt: Some(attempt),
        }
    }

    pub fn fail(attempt: u32, failure: RunFailure) -> Self {
        Self {
            from: RunState::Running,
            to: RunState::Failed,
            output: None,
            error: Some(failure),
            attempt: Some(attempt),
        }
    }

    /// Cancel from `Queued` or `Running`. Not tied to a particular claim.
    pub fn cancel(from: RunState, failure: RunFailure) -> Self {
        Self {
            from,
            to: RunState::Cancelled,
            output: None,
            error: Some(failure),
            attempt: None,
        }
    }

    /// Restrict the transition to the claim numbered `attempt`.
    pub fn for_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    /// Reject transitions outside the lifecycle table before touching storage.
    pub fn validate(&self) -> Result<(), RepositoryError> {
        if self.from.can_transition_to(self.to) {
            Ok(())
        } else {
            Err(RepositoryError::Conflict(format!(
                "illegal run transition {} -> {}",
                self.from, self.to
            )))
        }
    }
}

/// Filter criteria for listing runs.
#[derive(Debug, Clone, Default)]
pub struct RunFilter {
    pub skill_id: Option<SkillId>,
    pub state: Option<RunState>,
    pub requested_by: Option<PrincipalId>,
    /// Keyset cursor: only runs with an id strictly lower than this one.
    pub before: Option<RunId>,
    pub limit: Option<u32>,
}

/// Repository trait for run persistence.
///
/// Runs are never deleted; they are only created and transitioned.
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait RunRepository: Send + Sync {
    /// Insert a new `Queued` run.
    fn create(
        &self,
        run: &Run,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn get(
        &self,
        id: &RunId,
    ) -> impl std::future::Future<Output = Result<Option<Run>, RepositoryError>> + Send;

    /// Compare-and-swap state change. Returns the updated run.
    ///
    /// `NotFound` if the run does not exist, `Stale` if its state (or claim
    /// number) does not match, `Conflict` if the transition is illegal.
    fn transition(
        &self,
        id: &RunId,
        transition: &Transition,
    ) -> impl std::future::Future<Output = Result<Run, RepositoryError>> + Send;

    /// Recovery write for an abandoned claim: `Running -> Queued`, guarded by
    /// the claim number so a live worker's newer claim is never undone.
    fn requeue(
        &self,
        id: &RunId,
        attempt: u32,
    ) -> impl std::future::Future<Output = Result<Run, RepositoryError>> + Send;

    /// Runs matching the filter, newest first.
    fn list(
        &self,
        filter: &RunFilter,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Runs in `state` whose last state change happened before `cutoff`,
    /// oldest first.
    fn list_stale(
        &self,
        state: RunState,
        cutoff: DateTime<Utc>,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<Run>, RepositoryError>> + Send;

    /// Number of runs per state (states with no runs may be omitted).
    fn count_by_state(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<(RunState, u64)>, RepositoryError>> + Send;
}
