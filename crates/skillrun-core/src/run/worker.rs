//! Worker pool.
//!
//! Each worker pulls a run id from the [`RunQueue`], claims the run through
//! the store's compare-and-swap, executes the pinned skill version and
//! records the terminal state. Losing the claim race or finding the run
//! already terminal is not an error: the id is simply dropped.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use skillrun_types::error::RepositoryError;
use skillrun_types::run::{FailureKind, RunFailure, RunId, RunState};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::repository::run::{RunRepository, Transition};
use crate::repository::skill::SkillRegistry;
use crate::run::cancel::CancellationRegistry;
use crate::run::executor::{ExecutionContext, ExecutionError, Executor};
use crate::run::queue::RunQueue;

/// What a worker did with one dequeued id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The run was unknown, not `Queued`, claimed elsewhere, or moved on
    /// while executing (cancelled or requeued). Nothing was written.
    Discarded,
    /// This worker wrote the terminal state.
    Finished(RunState),
}

/// A fixed set of workers sharing one queue.
pub struct WorkerPool<R, S, E> {
    runs: Arc<R>,
    skills: Arc<S>,
    executor: Arc<E>,
    queue: Arc<RunQueue>,
    cancellations: Arc<CancellationRegistry>,
    execution_timeout: Duration,
    workers: usize,
}

impl<R, S, E> Clone for WorkerPool<R, S, E> {
    fn clone(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            skills: Arc::clone(&self.skills),
            executor: Arc::clone(&self.executor),
            queue: Arc::clone(&self.queue),
            cancellations: Arc::clone(&self.cancellations),
            execution_timeout: self.execution_timeout,
            workers: self.workers,
        }
    }
}

impl<R, S, E> WorkerPool<R, S, E>
where
    R: RunRepository + 'static,
    S: SkillRegistry + 'static,
    E: Executor + 'static,
{
    pub fn new(
        runs: Arc<R>,
        skills: Arc<S>,
        executor: Arc<E>,
        queue: Arc<RunQueue>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            runs,
            skills,
            executor,
            queue,
            cancellations,
            execution_timeout: Duration::from_secs(30),
            workers: 4,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Start the workers. Once `shutdown` fires they stop dequeuing and exit
    /// after finishing the run in hand.
    pub fn spawn(&self, shutdown: CancellationToken) -> Vec<JoinHandle<()>> {
        (0..self.workers)
            .map(|index| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                let span = tracing::info_span!("worker", index);
                tokio::spawn(async move { pool.run_worker(shutdown).await }.instrument(span))
            })
            .collect()
    }

    async fn run_worker(self, shutdown: CancellationToken) {
        tracing::debug!("worker started");
        while let Some(run_id) = self.queue.dequeue(&shutdown).await {
            match self.process(run_id).await {
                Ok(ProcessOutcome::Finished(state)) => {
                    tracing::info!(%run_id, %state, "run finished");
                }
                Ok(ProcessOutcome::Discarded) => {
                    tracing::debug!(%run_id, "run discarded");
                }
                Err(e) => {
                    tracing::warn!(%run_id, error = %e, "run processing failed");
                }
            }
        }
        tracing::debug!("worker stopped");
    }

    /// Claim, execute and finish one run.
    pub async fn process(&self, run_id: RunId) -> Result<ProcessOutcome, RepositoryError> {
        let Some(run) = self.runs.get(&run_id).await? else {
            return Ok(ProcessOutcome::Discarded);
        };
        if run.state != RunState::Queued {
            return Ok(ProcessOutcome::Discarded);
        }

        let version = self.skills.get_version(&run.skill_id, run.version).await?;

        let run = match self.runs.transition(&run_id, &Transition::claim()).await {
            Ok(run) => run,
            Err(RepositoryError::Stale { .. } | RepositoryError::NotFound) => {
                return Ok(ProcessOutcome::Discarded);
            }
            Err(e) => return Err(e),
        };
        let attempt = run.attempt;
        tracing::debug!(%run_id, attempt, "run claimed");

        let Some(version) = version else {
            let failure = RunFailure::new(
                FailureKind::MissingVersion,
                format!("skill {} has no version {}", run.skill_id, run.version),
            );
            return self.finish(run_id, Transition::fail(attempt, failure)).await;
        };

        let token = self.cancellations.register(run_id, attempt);
        // A cancel that landed between the claim and the registration found no token.
        match self.runs.get(&run_id).await {
            Ok(Some(current)) if current.state == RunState::Running && current.attempt == attempt => {}
            Ok(_) => {
                self.cancellations.remove(&run_id, attempt);
                tracing::debug!(%run_id, attempt, "run moved on before execution");
                return Ok(ProcessOutcome::Discarded);
            }
            Err(e) => {
                self.cancellations.remove(&run_id, attempt);
                return Err(e);
            }
        }

        let ctx = ExecutionContext::new(run_id, self.execution_timeout, token.clone());
        let deadline = ctx.deadline;
        let result = self.execute(version.content, run.input, ctx, &token, deadline).await;
        self.cancellations.remove(&run_id, attempt);

        let transition = match result {
            Ok(output) => Transition::succeed(attempt, output),
            Err(ExecutionError::Failed(message)) => Transition::fail(
                attempt,
                RunFailure::new(FailureKind::ExecutionFailed, message),
            ),
            Err(ExecutionError::Timeout) => Transition::fail(
                attempt,
                RunFailure::new(
                    FailureKind::ExecutionTimeout,
                    format!("exceeded {}s", self.execution_timeout.as_secs_f64()),
                ),
            ),
            Err(ExecutionError::Cancelled) => Transition::cancel(
                RunState::Running,
                RunFailure::new(FailureKind::Cancelled, "cancelled while running"),
            )
            .for_attempt(attempt),
        };
        self.finish(run_id, transition).await
    }

    /// Run the executor on its own task so a panic becomes a failure, and
    /// abandon it at the deadline or on cancellation.
    async fn execute(
        &self,
        content: skillrun_types::skill::SkillContent,
        input: Value,
        ctx: ExecutionContext,
        token: &CancellationToken,
        deadline: tokio::time::Instant,
    ) -> Result<Value, ExecutionError> {
        let executor = Arc::clone(&self.executor);
        let mut handle =
            tokio::spawn(async move { executor.execute(&content, &input, &ctx).await });

        tokio::select! {
            biased;
            joined = &mut handle => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => Err(ExecutionError::Failed("executor panicked".to_string())),
                Err(_) => Err(ExecutionError::Failed("executor task aborted".to_string())),
            },
            _ = token.cancelled() => {
                handle.abort();
                Err(ExecutionError::Cancelled)
            }
            _ = tokio::time::sleep_until(deadline) => {
                handle.abort();
                Err(ExecutionError::Timeout)
            }
        }
    }

    async fn finish(
        &self,
        run_id: RunId,
        transition: Transition,
    ) -> Result<ProcessOutcome, RepositoryError> {
        match self.runs.transition(&run_id, &transition).await {
            Ok(run) => Ok(ProcessOutcome::Finished(run.state)),
            Err(RepositoryError::Stale { actual, .. }) => {
                tracing::debug!(%run_id, %actual, wanted = %transition.to, "result discarded, run moved on");
                Ok(ProcessOutcome::Discarded)
            }
            Err(e) => Err(e),
        }
    }
}
