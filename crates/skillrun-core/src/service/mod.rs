//! Business logic services (use cases).
//!
//! Services orchestrate repository calls and the run queue, and consult the
//! access-control evaluator at every boundary. They depend on traits (ports),
//! never on concrete infrastructure implementations.

pub mod run;
pub mod skill;
