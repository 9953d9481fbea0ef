//! Bounded FIFO queue of run ids.
//!
//! The queue carries identifiers only; the run store holds the truth, so the
//! queue can always be rebuilt from `Queued` records after a crash. Delivery
//! is at-least-once from the workers' point of view (replays may duplicate
//! ids), which the claim compare-and-swap makes harmless.

use std::time::Duration;

use skillrun_types::run::RunId;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// No slot freed up within the enqueue timeout.
    #[error("run queue is at capacity")]
    Full,

    #[error("run queue is closed")]
    Closed,
}

/// A reserved queue slot. Dropping it without sending releases the slot.
pub struct QueueSlot<'a> {
    permit: mpsc::Permit<'a, RunId>,
}

impl QueueSlot<'_> {
    pub fn send(self, run_id: RunId) {
        self.permit.send(run_id);
    }
}

/// Single system-wide FIFO lane shared by all submitters and workers.
pub struct RunQueue {
    sender: mpsc::Sender<RunId>,
    receiver: Mutex<mpsc::Receiver<RunId>>,
    capacity: usize,
    enqueue_timeout: Duration,
}

impl RunQueue {
    /// Create a queue holding at most `capacity` ids. Submitters wait up to
    /// `enqueue_timeout` for a free slot (zero means fail immediately).
    pub fn new(capacity: usize, enqueue_timeout: Duration) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
            enqueue_timeout,
        }
    }

    /// Reserve a slot, waiting at most the enqueue timeout.
    ///
    /// Reserving before the run record is written lets a saturated queue
    /// reject the submission without leaving an orphaned `Queued` record.
    pub async fn reserve(&self) -> Result<QueueSlot<'_>, QueueError> {
        if self.enqueue_timeout.is_zero() {
            return match self.sender.try_reserve() {
                Ok(permit) => Ok(QueueSlot { permit }),
                Err(TrySendError::Full(())) => Err(QueueError::Full),
                Err(TrySendError::Closed(())) => Err(QueueError::Closed),
            };
        }

        match tokio::time::timeout(self.enqueue_timeout, self.sender.reserve()).await {
            Ok(Ok(permit)) => Ok(QueueSlot { permit }),
            Ok(Err(_)) => Err(QueueError::Closed),
            Err(_) => Err(QueueError::Full),
        }
    }

    /// Push a run id, waiting at most the enqueue timeout for space.
    pub async fn enqueue(&self, run_id: RunId) -> Result<(), QueueError> {
        self.reserve().await?.send(run_id);
        Ok(())
    }

    /// Push a run id only if a slot is free right now.
    pub fn try_enqueue(&self, run_id: RunId) -> Result<(), QueueError> {
        self.sender.try_send(run_id).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// Wait for the next run id. Returns `None` once `shutdown` fires.
    pub async fn dequeue(&self, shutdown: &CancellationToken) -> Option<RunId> {
        let mut receiver = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return None,
            guard = self.receiver.lock() => guard,
        };

        tokio::select! {
            biased;
            _ = shutdown.cancelled() => None,
            run_id = receiver.recv() => run_id,
        }
    }

    /// Ids waiting in the queue plus outstanding reservations.
    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl std::fmt::Debug for RunQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("enqueue_timeout", &self.enqueue_timeout)
            .finish()
    }
}
