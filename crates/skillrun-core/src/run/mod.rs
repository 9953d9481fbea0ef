//! Run execution machinery.
//!
//! Submission and execution are decoupled: a submitted run is recorded as
//! `Queued` and its id is pushed onto the [`queue::RunQueue`]. Workers in the
//! [`worker::WorkerPool`] pull ids, claim the run through the store's
//! compare-and-swap, and hand the pinned skill version to an
//! [`executor::Executor`]. The [`reconcile::Reconciler`] recovers runs whose
//! worker disappeared.

pub mod cancel;
pub mod executor;
pub mod queue;
pub mod reconcile;
pub mod worker;
