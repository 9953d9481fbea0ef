//! Recovery of abandoned runs.
//!
//! A run whose worker crashed stays `Running` forever unless something
//! notices. The reconciler periodically looks for runs that have not changed
//! state for `stale_after` and either puts them back on the queue or, once
//! the attempt limit is reached, fails them with `WorkerLost`. It also
//! re-delivers `Queued` runs whose queue entry was lost, and replays every
//! `Queued` run on startup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use skillrun_types::config::STALE_GRACE;
use skillrun_types::error::RepositoryError;
use skillrun_types::run::{FailureKind, RunFailure, RunId, RunState};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::repository::run::{RunFilter, RunRepository, Transition};
use crate::run::queue::{QueueError, RunQueue};

const BATCH: u32 = 200;

/// Counts from one reconciliation pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Stale `Running` runs moved back to `Queued`.
    pub requeued: usize,
    /// Stale `Running` runs failed because they used up their attempts.
    pub failed: usize,
    /// `Queued` runs whose id was pushed onto the queue again.
    pub reenqueued: usize,
}

pub struct Reconciler<R> {
    runs: Arc<R>,
    queue: Arc<RunQueue>,
    stale_after: Duration,
    execution_timeout: Duration,
    max_attempts: u32,
    interval: Duration,
}

impl<R: RunRepository + 'static> Reconciler<R> {
    pub fn new(runs: Arc<R>, queue: Arc<RunQueue>) -> Self {
        Self {
            runs,
            queue,
            stale_after: Duration::from_secs(300),
            execution_timeout: Duration::from_secs(30),
            max_attempts: 3,
            interval: Duration::from_secs(30),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Deadline the workers enforce. `Running` runs younger than this plus
    /// [`STALE_GRACE`] are never treated as abandoned.
    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    fn effective_stale_after(&self) -> Duration {
        self.stale_after.max(self.execution_timeout + STALE_GRACE)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_millis(10));
        self
    }

    /// One reconciliation pass over stale `Running` and `Queued` runs.
    pub async fn sweep(&self) -> Result<ReconcileReport, RepositoryError> {
        let stale_after = chrono::Duration::from_std(self.effective_stale_after())
            .unwrap_or(chrono::Duration::days(3650));
        let cutoff = Utc::now() - stale_after;
        let mut report = ReconcileReport::default();

        for run in self.runs.list_stale(RunState::Running, cutoff, BATCH).await? {
            if run.attempt >= self.max_attempts {
                let failure = RunFailure::new(
                    FailureKind::WorkerLost,
                    format!("worker lost after {} attempts", run.attempt),
                );
                match self.runs.transition(&run.id, &Transition::fail(run.attempt, failure)).await {
                    Ok(_) => {
                        tracing::warn!(run_id = %run.id, attempt = run.attempt, "abandoned run failed");
                        report.failed += 1;
                    }
                    Err(RepositoryError::Stale { .. } | RepositoryError::NotFound) => {}
                    Err(e) => return Err(e),
                }
                continue;
            }

            match self.runs.requeue(&run.id, run.attempt).await {
                Ok(_) => {
                    tracing::info!(run_id = %run.id, attempt = run.attempt, "abandoned run requeued");
                    report.requeued += 1;
                    // A full queue leaves the run Queued; a later pass re-delivers it.
                    if self.queue.try_enqueue(run.id).is_ok() {
                        report.reenqueued += 1;
                    }
                }
                Err(RepositoryError::Stale { .. } | RepositoryError::NotFound) => {}
                Err(e) => return Err(e),
            }
        }

        for run in self.runs.list_stale(RunState::Queued, cutoff, BATCH).await? {
            match self.queue.try_enqueue(run.id) {
                Ok(()) => report.reenqueued += 1,
                Err(QueueError::Full | QueueError::Closed) => break,
            }
        }

        Ok(report)
    }

    /// Push every `Queued` run onto the queue, oldest first. Used at startup,
    /// when the in-memory queue is empty but the store may hold work.
    pub async fn replay_queued(&self) -> Result<usize, RepositoryError> {
        let mut ids: Vec<RunId> = Vec::new();
        let mut before = None;
        loop {
            let page = self
                .runs
                .list(&RunFilter {
                    state: Some(RunState::Queued),
                    before,
                    limit: Some(BATCH),
                    ..Default::default()
                })
                .await?;
            let Some(last) = page.last() else { break };
            before = Some(last.id);
            let done = page.len() < BATCH as usize;
            ids.extend(page.iter().map(|r| r.id));
            if done {
                break;
            }
        }

        let mut replayed = 0;
        for id in ids.into_iter().rev() {
            match self.queue.enqueue(id).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "queue replay stopped early, sweeps will redeliver the rest");
                    break;
                }
            }
        }
        Ok(replayed)
    }

    /// Replay queued runs, then sweep every `interval` until `shutdown`.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        let span = tracing::info_span!("reconciler");
        tokio::spawn(
            async move {
                match self.replay_queued().await {
                    Ok(n) if n > 0 => tracing::info!(replayed = n, "queued runs replayed"),
                    Ok(_) => {}
                    Err(e) => tracing::error!(error = %e, "queue replay failed"),
                }

                let mut ticker = tokio::time::interval(self.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => break,
                        _ = ticker.tick() => match self.sweep().await {
                            Ok(report) if report != ReconcileReport::default() => {
                                tracing::info!(
                                    requeued = report.requeued,
                                    failed = report.failed,
                                    reenqueued = report.reenqueued,
                                    "reconciliation pass"
                                );
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "reconciliation pass failed"),
                        },
                    }
                }
                tracing::debug!("reconciler stopped");
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::run::cancel::CancellationRegistry;
    use crate::run::executor::{ExecutionContext, ExecutionError, Executor};
    use crate::run::worker::WorkerPool;
    use crate::testing::{InMemoryRunRepository, InMemorySkillRepository, sample_content, sample_skill};
    use serde_json::{Value, json};
    use skillrun_types::principal::PrincipalId;
    use skillrun_types::run::Run;
    use skillrun_types::skill::{SkillContent, SkillId, Visibility};

    /// Slow executor that counts how often it is entered.
    struct CountingExecutor {
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Executor for CountingExecutor {
        async fn execute(
            &self,
            _content: &SkillContent,
            input: &Value,
            _ctx: &ExecutionContext,
        ) -> Result<Value, ExecutionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(input.clone())
        }
    }

    fn reconciler(runs: &Arc<InMemoryRunRepository>, queue: &Arc<RunQueue>) -> Reconciler<InMemoryRunRepository> {
        Reconciler::new(Arc::clone(runs), Arc::clone(queue))
            .with_stale_after(Duration::from_secs(60))
            .with_max_attempts(2)
    }

    async fn running(runs: &InMemoryRunRepository, age: chrono::Duration) -> Run {
        let run = Run::queued(SkillId::new(), 1, PrincipalId::new(), json!({}));
        runs.create(&run).await.unwrap();
        let mut claimed = runs.transition(&run.id, &Transition::claim()).await.unwrap();
        claimed.updated_at = Utc::now() - age;
        runs.force(claimed.clone());
        claimed
    }

    #[tokio::test]
    async fn test_stale_running_run_is_requeued_and_redelivered() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let run = running(&runs, chrono::Duration::minutes(10)).await;

        let report = reconciler(&runs, &queue).sweep().await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(report.failed, 0);

        let stored = runs.snapshot(&run.id).unwrap();
        assert_eq!(stored.state, RunState::Queued);
        assert_eq!(stored.attempt, 1);
        assert!(stored.started_at.is_none());
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_fresh_running_run_is_left_alone() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let run = running(&runs, chrono::Duration::seconds(5)).await;

        let report = reconciler(&runs, &queue).sweep().await.unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert_eq!(runs.snapshot(&run.id).unwrap().state, RunState::Running);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_out_of_attempts_fails_with_worker_lost() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let run = running(&runs, chrono::Duration::minutes(10)).await;
        let mut second = run.clone();
        second.attempt = 2;
        runs.force(second);

        let report = reconciler(&runs, &queue).sweep().await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = runs.snapshot(&run.id).unwrap();
        assert_eq!(stored.state, RunState::Failed);
        assert_eq!(stored.error.unwrap().kind, FailureKind::WorkerLost);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_stale_queued_run_is_reenqueued() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let mut run = Run::queued(SkillId::new(), 1, PrincipalId::new(), json!({}));
        run.updated_at = Utc::now() - chrono::Duration::hours(1);
        runs.create(&run).await.unwrap();

        let report = reconciler(&runs, &queue).sweep().await.unwrap();
        assert_eq!(report.reenqueued, 1);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_short_stale_after_never_requeues_live_execution() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let skills = Arc::new(InMemorySkillRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let owner = PrincipalId::new();
        let skill = sample_skill(owner, Visibility::Private);
        skills.seed(skill.clone(), sample_content());
        let run = Run::queued(skill.id, 1, owner, json!("once"));
        runs.create(&run).await.unwrap();

        let executor = Arc::new(CountingExecutor {
            calls: AtomicUsize::new(0),
            delay: Duration::from_millis(300),
        });
        let pool = WorkerPool::new(
            Arc::clone(&runs),
            skills,
            Arc::clone(&executor),
            Arc::clone(&queue),
            Arc::new(CancellationRegistry::new()),
        )
        .with_workers(2)
        .with_execution_timeout(Duration::from_secs(30));
        let shutdown = CancellationToken::new();
        let handles = pool.spawn(shutdown.clone());
        queue.enqueue(run.id).await.unwrap();

        while runs.snapshot(&run.id).unwrap().state != RunState::Running {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let report = Reconciler::new(Arc::clone(&runs), Arc::clone(&queue))
            .with_stale_after(Duration::from_millis(1))
            .with_execution_timeout(Duration::from_secs(30))
            .sweep()
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport::default());

        for _ in 0..200 {
            if runs.snapshot(&run.id).unwrap().state == RunState::Succeeded {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stored = runs.snapshot(&run.id).unwrap();
        assert_eq!(stored.state, RunState::Succeeded);
        assert_eq!(stored.attempt, 1);
        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

        shutdown.cancel();
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_replay_enqueues_queued_runs_oldest_first() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(8, Duration::ZERO));
        let mut ids = Vec::new();
        for _ in 0..3 {
            let run = Run::queued(SkillId::new(), 1, PrincipalId::new(), json!({}));
            runs.create(&run).await.unwrap();
            ids.push(run.id);
        }
        running(&runs, chrono::Duration::seconds(1)).await;

        let replayed = reconciler(&runs, &queue).replay_queued().await.unwrap();
        assert_eq!(replayed, 3);

        let shutdown = CancellationToken::new();
        for expected in ids {
            assert_eq!(queue.dequeue(&shutdown).await, Some(expected));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_replay_stops_when_queue_is_full() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(1, Duration::ZERO));
        for _ in 0..3 {
            let run = Run::queued(SkillId::new(), 1, PrincipalId::new(), json!({}));
            runs.create(&run).await.unwrap();
        }

        let replayed = reconciler(&runs, &queue).replay_queued().await.unwrap();
        assert_eq!(replayed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reconciler_stops_on_shutdown() {
        let runs = Arc::new(InMemoryRunRepository::default());
        let queue = Arc::new(RunQueue::new(4, Duration::ZERO));
        let shutdown = CancellationToken::new();
        let handle = reconciler(&runs, &queue)
            .with_interval(Duration::from_secs(1))
            .spawn(shutdown.clone());

        tokio::time::sleep(Duration::from_secs(3)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }
}
