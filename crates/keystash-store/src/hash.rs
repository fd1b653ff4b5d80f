//! Content hashing for backups.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ring::digest;

/// Turns bytes into a short, stable token.
pub trait ContentHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> String;
}

/// SHA-256, base64url encoded without padding (43 characters).
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl ContentHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> String {
        let hash = digest::digest(&digest::SHA256, data);
        URL_SAFE_NO_PAD.encode(hash.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_known_vector() {
        // SHA-256("abc") = ba7816bf...f20015ad
        assert_eq!(
            Sha256Hasher.hash(b"abc"),
            "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0"
        );
    }

    #[test]
    fn distinct_inputs_distinct_tokens() {
        assert_ne!(Sha256Hasher.hash(b"a.json"), Sha256Hasher.hash(b"b.json"));
        assert_eq!(Sha256Hasher.hash(b"").len(), 43);
    }
}
