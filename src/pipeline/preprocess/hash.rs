use base64::Engine;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 content hash used as the dedup / idempotency key.
///
/// Identical raw bytes always hash identically, which is what lets the
/// processor short-circuit repeat analyses within the freshness window.
pub fn compute_content_hash(bytes: &[u8]) -> String {
    let hash = Sha256::digest(bytes);
    base64::engine::general_purpose::STANDARD.encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_deterministic() {
        let h1 = compute_content_hash(b"invoice bytes");
        let h2 = compute_content_hash(b"invoice bytes");
        assert_eq!(h1, h2);
    }

    #[test]
    fn different_content_different_hash() {
        let h1 = compute_content_hash(b"Content A");
        let h2 = compute_content_hash(b"Content B");
        assert_ne!(h1, h2);
    }

    #[test]
    fn empty_input_hashes() {
        let h = compute_content_hash(b"");
        assert!(!h.is_empty());
    }
}
