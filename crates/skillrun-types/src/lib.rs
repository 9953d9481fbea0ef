//! Shared domain types for skillrun.
//!
//! This crate contains the core domain types used across the platform:
//! principals, skills and their immutable versions, runs and their lifecycle
//! states, runner configuration, and the associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod principal;
pub mod run;
pub mod skill;
