//! Cryptographic helpers.

pub mod api_key;
