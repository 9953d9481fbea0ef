//! Executor capability.
//!
//! An [`Executor`] runs one skill version against one input. The worker pool
//! only depends on this trait, so the simulated runner can be swapped for a
//! sandboxed one without touching the queue, store, or access control.

use std::time::Duration;

use serde_json::Value;
use skillrun_types::run::RunId;
use skillrun_types::skill::SkillContent;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-execution limits handed to the executor.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    /// The executor must return by this instant.
    pub deadline: Instant,
    /// Fired when the run is cancelled while executing.
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    pub fn new(run_id: RunId, timeout: Duration, cancellation: CancellationToken) -> Self {
        Self {
            run_id,
            deadline: Instant::now() + timeout,
            cancellation,
        }
    }

    /// Time left before the deadline (zero once it has passed).
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    #[error("execution failed: {0}")]
    Failed(String),

    #[error("execution exceeded its deadline")]
    Timeout,

    #[error("execution cancelled")]
    Cancelled,
}

/// Trait for skill execution backends.
///
/// Implementations must respect `ctx.deadline` and should observe
/// `ctx.cancellation`; the worker abandons the call at the deadline either way.
pub trait Executor: Send + Sync {
    fn execute(
        &self,
        content: &SkillContent,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> impl std::future::Future<Output = Result<Value, ExecutionError>> + Send;
}

/// Stand-in runner: waits a fixed delay, then echoes its input.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    delay: Duration,
}

impl SimulatedExecutor {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for SimulatedExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Executor for SimulatedExecutor {
    async fn execute(
        &self,
        content: &SkillContent,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<Value, ExecutionError> {
        tracing::debug!(
            run_id = %ctx.run_id,
            skill_md_bytes = content.skill_md.len(),
            "simulated execution started"
        );

        tokio::select! {
            biased;
            _ = ctx.cancellation.cancelled() => Err(ExecutionError::Cancelled),
            _ = tokio::time::sleep_until(ctx.deadline) => Err(ExecutionError::Timeout),
            _ = tokio::time::sleep(self.delay) => Ok(input.clone()),
        }
    }
}
