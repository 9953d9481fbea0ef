//! Global configuration types for skillrun.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls the
//! HTTP listener and the run queue / worker pool. All fields have defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Slack past the execution deadline before a `Running` run may be treated
/// as abandoned. Covers the worker's terminal write after the deadline fires.
pub const STALE_GRACE: Duration = Duration::from_secs(10);

/// Top-level configuration, loaded from `~/.skillrun/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8640
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Queue, worker pool, and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of concurrent workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Maximum number of run ids waiting in the queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long a submission waits for queue space before `Backpressure`.
    #[serde(default = "default_enqueue_timeout_ms")]
    pub enqueue_timeout_ms: u64,
    /// Executor deadline per run.
    #[serde(default = "default_execution_timeout_secs")]
    pub execution_timeout_secs: u64,
    /// Interval between reconciliation sweeps.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Age after which a `Running` run is considered abandoned. Never
    /// effectively shorter than the execution deadline plus [`STALE_GRACE`].
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Claims allowed before an abandoned run is failed instead of requeued.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Artificial latency of the simulated executor.
    #[serde(default = "default_simulated_delay_ms")]
    pub simulated_delay_ms: u64,
}

fn default_workers() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    256
}

fn default_enqueue_timeout_ms() -> u64 {
    500
}

fn default_execution_timeout_secs() -> u64 {
    30
}

fn default_reconcile_interval_secs() -> u64 {
    30
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_max_attempts() -> u32 {
    3
}

fn default_simulated_delay_ms() -> u64 {
    1000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            queue_capacity: default_queue_capacity(),
            enqueue_timeout_ms: default_enqueue_timeout_ms(),
            execution_timeout_secs: default_execution_timeout_secs(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            stale_after_secs: default_stale_after_secs(),
            max_attempts: default_max_attempts(),
            simulated_delay_ms: default_simulated_delay_ms(),
        }
    }
}

impl RunnerConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }

    pub fn enqueue_timeout(&self) -> Duration {
        Duration::from_millis(self.enqueue_timeout_ms)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs.max(1))
    }

    /// Effective abandonment age. A live execution must hit its deadline
    /// before the reconciler may requeue it.
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs.max(1)).max(self.execution_timeout() + STALE_GRACE)
    }

    pub fn attempt_limit(&self) -> u32 {
        self.max_attempts.max(1)
    }

    pub fn simulated_delay(&self) -> Duration {
        Duration::from_millis(self.simulated_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8640);
        assert_eq!(config.runner.workers, 4);
        assert_eq!(config.runner.queue_capacity, 256);
        assert_eq!(config.runner.max_attempts, 3);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 9000

[runner]
workers = 8
queue_capacity = 16
stale_after_secs = 60
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.runner.workers, 8);
        assert_eq!(config.runner.queue_capacity, 16);
        assert_eq!(config.runner.stale_after(), Duration::from_secs(60));
        assert_eq!(config.runner.execution_timeout_secs, 30);
    }

    #[test]
    fn test_runner_config_clamps_zero_values() {
        let config = RunnerConfig {
            workers: 0,
            queue_capacity: 0,
            max_attempts: 0,
            ..RunnerConfig::default()
        };
        assert_eq!(config.worker_count(), 1);
        assert_eq!(config.capacity(), 1);
        assert_eq!(config.attempt_limit(), 1);
    }

    #[test]
    fn test_stale_after_never_undercuts_execution_deadline() {
        let config = RunnerConfig {
            stale_after_secs: 1,
            execution_timeout_secs: 30,
            ..RunnerConfig::default()
        };
        assert_eq!(config.stale_after(), Duration::from_secs(30) + STALE_GRACE);

        let config = RunnerConfig {
            stale_after_secs: 600,
            execution_timeout_secs: 30,
            ..RunnerConfig::default()
        };
        assert_eq!(config.stale_after(), Duration::from_secs(600));
    }
}
