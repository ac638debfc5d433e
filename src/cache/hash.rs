//! Content hashing for cache version tokens.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Compute SHA256 hash of a serializable value.
///
/// The value is serialized to JSON before hashing, ensuring deterministic output.
/// Returns a 64-character lowercase hexadecimal string.
pub fn compute_hash<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

/// Short version token for a record: the first 12 hex digits of its hash.
pub fn version_token<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let mut hash = compute_hash(value)?;
    hash.truncate(12);
    Ok(hash)
}
