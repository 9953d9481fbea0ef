//! Run service: the boundary the HTTP layer talks to.
//!
//! Submission validates access and the skill reference synchronously and
//! returns a `Queued` run; execution results are only ever observed by
//! reading the run record afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use skillrun_types::error::{RepositoryError, RunError};
use skillrun_types::principal::PrincipalId;
use skillrun_types::run::{FailureKind, Run, RunFailure, RunId, RunState};
use skillrun_types::skill::{SkillId, VersionSelector};

use crate::access;
use crate::repository::run::{RunFilter, RunRepository, Transition};
use crate::repository::skill::SkillRegistry;
use crate::run::cancel::CancellationRegistry;
use crate::run::queue::{QueueError, RunQueue};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// Upper bound on records examined per listing call. A page cut short by
/// this limit still carries a cursor to continue from.
const MAX_SCANNED: usize = 1000;
const SCAN_BATCH: u32 = 100;
const CANCEL_RETRIES: usize = 5;

/// A request to execute one skill version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRun {
    pub skill_id: SkillId,
    #[serde(default)]
    pub version: VersionSelector,
    #[serde(default)]
    pub input: Value,
}

/// Listing filters. `cursor` is the id of the last run of the previous page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunQuery {
    pub skill_id: Option<SkillId>,
    pub state: Option<RunState>,
    pub requested_by: Option<PrincipalId>,
    pub cursor: Option<RunId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPage {
    pub runs: Vec<Run>,
    pub next_cursor: Option<RunId>,
}

pub struct RunService<R: RunRepository, S: SkillRegistry> {
    runs: Arc<R>,
    skills: Arc<S>,
    queue: Arc<RunQueue>,
    cancellations: Arc<CancellationRegistry>,
}

impl<R: RunRepository, S: SkillRegistry> RunService<R, S> {
    pub fn new(
        runs: Arc<R>,
        skills: Arc<S>,
        queue: Arc<RunQueue>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            runs,
            skills,
            queue,
            cancellations,
        }
    }

    /// Accept a run request.
    ///
    /// A skill the caller cannot see is reported as an invalid reference so
    /// its existence does not leak. A queue slot is reserved before the
    /// record is written, so `Backpressure` never leaves an orphan `Queued`
    /// record behind.
    pub async fn submit(&self, principal: &PrincipalId, request: SubmitRun) -> Result<Run, RunError> {
        let not_found = || RunError::InvalidReference(format!("skill {} not found", request.skill_id));

        let skill = self
            .skills
            .get_skill(&request.skill_id)
            .await
            .map_err(storage)?
            .ok_or_else(not_found)?;

        let permissions = access::evaluate(principal, &skill);
        if !permissions.can_view {
            return Err(not_found());
        }
        if !permissions.can_run {
            return Err(RunError::Unauthorized { action: "run" });
        }

        let version = match request.version {
            VersionSelector::Latest => self.skills.latest_version(&skill.id).await,
            VersionSelector::Exact(n) => self.skills.get_version(&skill.id, n).await,
        }
        .map_err(storage)?
        .ok_or_else(|| {
            RunError::InvalidReference(format!("skill {} has no version {}", skill.id, request.version))
        })?;

        let slot = self.queue.reserve().await.map_err(|e| match e {
            QueueError::Full => RunError::Backpressure,
            QueueError::Closed => RunError::Storage(e.to_string()),
        })?;

        let run = Run::queued(skill.id, version.version, *principal, request.input);
        self.runs.create(&run).await.map_err(storage)?;
        slot.send(run.id);

        tracing::info!(
            run_id = %run.id,
            skill_id = %skill.id,
            version = version.version,
            principal = %principal,
            "run queued"
        );
        Ok(run)
    }

    /// Read a run. Visibility follows the skill's current permissions.
    pub async fn get(&self, principal: &PrincipalId, run_id: &RunId) -> Result<Run, RunError> {
        let run = self
            .runs
            .get(run_id)
            .await
            .map_err(storage)?
            .ok_or(RunError::NotFound)?;

        if !self.permissions(principal, &run.skill_id).await?.can_view {
            return Err(RunError::Unauthorized { action: "view" });
        }
        Ok(run)
    }

    /// Cancel a run. Already-terminal runs are returned unchanged.
    ///
    /// A `Running` run is marked `Cancelled` first and its executor is then
    /// signalled; the worker's own terminal write loses the compare-and-swap.
    pub async fn cancel(&self, principal: &PrincipalId, run_id: &RunId) -> Result<Run, RunError> {
        let mut run = self
            .runs
            .get(run_id)
            .await
            .map_err(storage)?
            .ok_or(RunError::NotFound)?;

        let permissions = self.permissions(principal, &run.skill_id).await?;
        if !permissions.can_view || !access::can_cancel(&permissions) {
            return Err(RunError::Unauthorized { action: "cancel" });
        }

        let mut expected = run.state;
        for _ in 0..CANCEL_RETRIES {
            if run.state.is_terminal() {
                return Ok(run);
            }

            let failure = RunFailure::new(FailureKind::Cancelled, format!("cancelled by {principal}"));
            match self
                .runs
                .transition(run_id, &Transition::cancel(run.state, failure))
                .await
            {
                Ok(cancelled) => {
                    if run.state == RunState::Running {
                        self.cancellations.cancel(run_id);
                    }
                    tracing::info!(%run_id, from = %run.state, principal = %principal, "run cancelled");
                    return Ok(cancelled);
                }
                Err(RepositoryError::Stale { .. }) => {
                    expected = run.state;
                    run = self
                        .runs
                        .get(run_id)
                        .await
                        .map_err(storage)?
                        .ok_or(RunError::NotFound)?;
                }
                Err(e) => return Err(storage(e)),
            }
        }

        Err(RunError::StaleTransition {
            run_id: *run_id,
            expected,
            actual: run.state,
        })
    }

    /// List runs the caller may view, newest first.
    ///
    /// Runs on skills the caller cannot view are skipped, never reported, so
    /// a page can be shorter than `limit` while more results remain.
    pub async fn list(&self, principal: &PrincipalId, query: RunQuery) -> Result<RunPage, RunError> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 || limit > MAX_PAGE_SIZE {
            return Err(RunError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        let limit = limit as usize;

        let mut visible: HashMap<SkillId, bool> = HashMap::new();
        if let Some(skill_id) = query.skill_id {
            let can_view = self.permissions(principal, &skill_id).await?.can_view;
            if !can_view {
                return Ok(RunPage {
                    runs: Vec::new(),
                    next_cursor: None,
                });
            }
            visible.insert(skill_id, true);
        }

        let mut runs = Vec::with_capacity(limit);
        let mut before = query.cursor;
        let mut scanned = 0;

        loop {
            let batch = self
                .runs
                .list(&RunFilter {
                    skill_id: query.skill_id,
                    state: query.state,
                    requested_by: query.requested_by,
                    before,
                    limit: Some(SCAN_BATCH),
                })
                .await
                .map_err(storage)?;
            let exhausted = batch.len() < SCAN_BATCH as usize;

            for run in batch {
                scanned += 1;
                before = Some(run.id);

                let can_view = match visible.get(&run.skill_id) {
                    Some(v) => *v,
                    None => {
                        let v = self.permissions(principal, &run.skill_id).await?.can_view;
                        visible.insert(run.skill_id, v);
                        v
                    }
                };
                if !can_view {
                    continue;
                }

                runs.push(run);
                if runs.len() == limit {
                    let next_cursor = runs.last().map(|r: &Run| r.id);
                    return Ok(RunPage { runs, next_cursor });
                }
            }

            if exhausted {
                return Ok(RunPage {
                    runs,
                    next_cursor: None,
                });
            }
            if scanned >= MAX_SCANNED {
                return Ok(RunPage {
                    runs,
                    next_cursor: before,
                });
            }
        }
    }

    /// Run counts per state, every state included.
    pub async fn state_counts(&self) -> Result<Vec<(RunState, u64)>, RunError> {
        let counts = self.runs.count_by_state().await.map_err(storage)?;
        Ok(RunState::ALL
            .into_iter()
            .map(|state| {
                let n = counts
                    .iter()
                    .find(|(s, _)| *s == state)
                    .map(|(_, n)| *n)
                    .unwrap_or(0);
                (state, n)
            })
            .collect())
    }

    /// Ids currently waiting in the in-memory queue.
    pub fn queue_depth(&self) -> usize {
        self.queue.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    async fn permissions(
        &self,
        principal: &PrincipalId,
        skill_id: &SkillId,
    ) -> Result<skillrun_types::skill::Permissions, RunError> {
        Ok(self
            .skills
            .get_skill(skill_id)
            .await
            .map_err(storage)?
            .map(|skill| access::evaluate(principal, &skill))
            .unwrap_or_default())
    }
}

fn storage(e: RepositoryError) -> RunError {
    RunError::Storage(e.to_string())
}
