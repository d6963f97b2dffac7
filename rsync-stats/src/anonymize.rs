use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

pub const HOSTHASH_LEN: usize = 10;

/// Stable pseudonym for a client hostname: the first `HOSTHASH_LEN` characters
/// of the base64-encoded SHA-256 digest.
pub fn hosthash(hostname: &str) -> String {
    let digest = Sha256::digest(hostname.as_bytes());
    let mut encoded = STANDARD.encode(digest);
    encoded.truncate(HOSTHASH_LEN);
    encoded
}
