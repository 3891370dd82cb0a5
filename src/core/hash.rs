//! Domain-Separated Hashing
//!
//! SHA-256 wrapper used by commitments and by the arbiter state digest.
//! Every caller picks its own domain separator so digests from different
//! contexts can never collide by construction.

use sha2::{Sha256, Digest};

use super::geometry::Position;

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Domain for the public arbiter state digest.
pub const ARBITER_STATE_DOMAIN: &[u8] = b"DUEL_ARBITER_STATE_V1";

/// Deterministic hasher.
///
/// Order of updates is part of the digest.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for the arbiter state digest.
    pub fn for_arbiter_state() -> Self {
        Self::new(ARBITER_STATE_DOMAIN)
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an i64 value (little-endian).
    #[inline]
    pub fn update_i64(&mut self, value: i64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a grid position.
    #[inline]
    pub fn update_position(&mut self, value: Position) {
        self.update_i64(value.x);
        self.update_i64(value.y);
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with an optional digest, tagging presence first.
    #[inline]
    pub fn update_optional(&mut self, value: Option<&StateHash>) {
        match value {
            Some(digest) => {
                self.update_bool(true);
                self.update_bytes(digest);
            }
            None => self.update_bool(false),
        }
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute hash with domain separator.
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> StateHash {
    let mut hasher = StateHasher::new(domain);
    hasher.update_bytes(data);
    hasher.finalize()
}

/// First four bytes as hex, for log lines.
pub fn short_hex(digest: &StateHash) -> String {
    hex::encode(&digest[..4])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_arbiter_state();
            hasher.update_u64(100);
            hasher.update_position(Position::new(-3, 7));
            hasher.update_optional(Some(&[9u8; 32]));
            hasher.update_bool(true);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_i64(1);
            h.update_i64(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_i64(2);
            h.update_i64(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let data = [1u8, 2, 3, 4];

        let hash1 = hash_with_domain(b"DOMAIN_A", &data);
        let hash2 = hash_with_domain(b"DOMAIN_B", &data);

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_optional_presence_is_tagged() {
        let absent = {
            let mut h = StateHasher::new(b"test");
            h.update_optional(None);
            h.finalize()
        };
        let zero = {
            let mut h = StateHasher::new(b"test");
            h.update_optional(Some(&[0u8; 32]));
            h.finalize()
        };
        assert_ne!(absent, zero);
    }

    #[test]
    fn test_short_hex() {
        assert_eq!(short_hex(&[0xAB; 32]), "abababab");
    }
}
