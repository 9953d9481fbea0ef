//! Business logic and repository trait definitions for skillrun.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, the access-control evaluator, and the run-execution
//! machinery: bounded queue, worker pool, executor capability, and the
//! reconciler that recovers abandoned runs. It depends only on
//! `skillrun-types` -- never on `skillrun-infra` or any database crate.

pub mod access;
pub mod repository;
pub mod run;
pub mod service;

#[cfg(test)]
pub(crate) mod testing;
