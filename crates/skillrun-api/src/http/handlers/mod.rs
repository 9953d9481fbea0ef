//! HTTP request handlers for the REST API.

pub mod me;
pub mod run;
pub mod skill;
