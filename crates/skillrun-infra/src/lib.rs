//! Infrastructure layer for skillrun.
//!
//! Contains implementations of the repository traits defined in
//! `skillrun-core`: SQLite storage for principals, skills and runs, the
//! config-file loader, data directory resolution, and API-key hashing.

pub mod config;
pub mod crypto;
pub mod sqlite;
