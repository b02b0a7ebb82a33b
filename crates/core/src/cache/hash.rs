//! Request keys for bucket entries.

use sha2::{Digest, Sha256};

/// Compute the bucket key of a request.
///
/// Only GET responses are ever stored, so the method is part of the key
/// purely to keep keys from colliding if that changes.
pub fn compute_request_key(method: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
