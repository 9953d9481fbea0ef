//! API key generation and hashing.
//!
//! Keys are 32 random bytes rendered as hex behind a `skr_` prefix. Only the
//! SHA-256 digest is stored; the plaintext is shown once at creation.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const KEY_PREFIX: &str = "skr_";

/// Generate a new plaintext API key.
pub fn generate_api_key() -> String {
    let mut key_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut key_bytes);
    format!(
        "{KEY_PREFIX}{}",
        key_bytes.iter().map(|b| format!("{b:02x}")).collect::<String>()
    )
}

/// Compute SHA-256 hash of an API key (lowercase hex).
pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    format!("{:x}", digest)
}
