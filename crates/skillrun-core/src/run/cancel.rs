//! Cooperative cancellation for in-flight executions.
//!
//! Each running execution registers a token keyed by run id and tagged with
//! the attempt that owns it. Cancelling a run fires the token; the executor
//! is expected to notice and return, and the worker stops waiting on it
//! either way.

use dashmap::DashMap;
use skillrun_types::run::RunId;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct CancellationRegistry {
    tokens: DashMap<RunId, (u32, CancellationToken)>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `attempt` of `run_id`, replacing any
    /// previous one.
    pub fn register(&self, run_id: RunId, attempt: u32) -> CancellationToken {
        let token = CancellationToken::new();
        self.tokens.insert(run_id, (attempt, token.clone()));
        token
    }

    /// Fire the token for `run_id`. Returns `false` if no execution of that
    /// run is in flight in this process.
    pub fn cancel(&self, run_id: &RunId) -> bool {
        match self.tokens.get(run_id) {
            Some(entry) => {
                entry.1.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token of `attempt`. A token registered by a later attempt
    /// of the same run is left in place.
    pub fn remove(&self, run_id: &RunId, attempt: u32) {
        self.tokens.remove_if(run_id, |_, (owner, _)| *owner == attempt);
    }

    /// Number of executions currently in flight.
    pub fn active(&self) -> usize {
        self.tokens.len()
    }
}
