//! Hashing helpers for on-disk state file names.

use sha2::{Digest, Sha256};

use crate::consts::STATE_KEY_HASH_LEN;

/// Full lowercase hex SHA-256 of `data`.
pub fn hash_bytes(data: &[u8]) -> String {
  hex::encode(Sha256::digest(data))
}

/// Truncated hash used to name state files.
pub fn key_hash(key: &str) -> String {
  let mut full = hash_bytes(key.as_bytes());
  full.truncate(STATE_KEY_HASH_LEN);
  full
}
