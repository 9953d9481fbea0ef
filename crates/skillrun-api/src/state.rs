//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository traits, but AppState pins them to the
//! SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use skillrun_core::run::cancel::CancellationRegistry;
use skillrun_core::run::executor::SimulatedExecutor;
use skillrun_core::run::queue::RunQueue;
use skillrun_core::run::reconcile::Reconciler;
use skillrun_core::run::worker::WorkerPool;
use skillrun_core::service::run::RunService;
use skillrun_core::service::skill::SkillService;
use skillrun_infra::config::{load_global_config, resolve_data_dir};
use skillrun_infra::sqlite::pool::{DatabasePool, database_url};
use skillrun_infra::sqlite::principal::SqlitePrincipalRepository;
use skillrun_infra::sqlite::run::SqliteRunRepository;
use skillrun_infra::sqlite::skill::SqliteSkillRepository;
use skillrun_types::config::GlobalConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteRunService = RunService<SqliteRunRepository, SqliteSkillRepository>;

pub type ConcreteSkillService = SkillService<SqliteSkillRepository, SqlitePrincipalRepository>;

pub type ConcreteWorkerPool =
    WorkerPool<SqliteRunRepository, SqliteSkillRepository, SimulatedExecutor>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub run_service: Arc<ConcreteRunService>,
    pub skill_service: Arc<ConcreteSkillService>,
    pub principals: Arc<SqlitePrincipalRepository>,
    pub runs: Arc<SqliteRunRepository>,
    pub skills: Arc<SqliteSkillRepository>,
    pub queue: Arc<RunQueue>,
    pub cancellations: Arc<CancellationRegistry>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Resolve the data directory, load `config.toml`, and open the database.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();
        tokio::fs::create_dir_all(&data_dir).await?;
        let config = load_global_config(&data_dir).await;
        Self::open(data_dir, config).await
    }

    /// Wire services against the database in `data_dir` using `config`.
    pub async fn open(data_dir: PathBuf, config: GlobalConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;

        let runs = Arc::new(SqliteRunRepository::new(db_pool.clone()));
        let skills = Arc::new(SqliteSkillRepository::new(db_pool.clone()));
        let principals = Arc::new(SqlitePrincipalRepository::new(db_pool));

        let queue = Arc::new(RunQueue::new(
            config.runner.capacity(),
            config.runner.enqueue_timeout(),
        ));
        let cancellations = Arc::new(CancellationRegistry::new());

        let run_service = RunService::new(
            runs.clone(),
            skills.clone(),
            queue.clone(),
            cancellations.clone(),
        );
        let skill_service = SkillService::new(skills.clone(), principals.clone());

        tracing::debug!(data_dir = %data_dir.display(), "application state initialized");

        Ok(Self {
            run_service: Arc::new(run_service),
            skill_service: Arc::new(skill_service),
            principals,
            runs,
            skills,
            queue,
            cancellations,
            config,
            data_dir,
        })
    }

    /// Worker pool sized and timed from `[runner]`, running the simulated executor.
    pub fn worker_pool(&self) -> ConcreteWorkerPool {
        let runner = &self.config.runner;
        WorkerPool::new(
            self.runs.clone(),
            self.skills.clone(),
            Arc::new(SimulatedExecutor::new(runner.simulated_delay())),
            self.queue.clone(),
            self.cancellations.clone(),
        )
        .with_workers(runner.worker_count())
        .with_execution_timeout(runner.execution_timeout())
    }

    pub fn reconciler(&self) -> Reconciler<SqliteRunRepository> {
        let runner = &self.config.runner;
        Reconciler::new(self.runs.clone(), self.queue.clone())
            .with_stale_after(runner.stale_after())
            .with_execution_timeout(runner.execution_timeout())
            .with_max_attempts(runner.attempt_limit())
            .with_interval(runner.reconcile_interval())
    }
}
