//! Commitment Codec
//!
//! Hide a choice (or a position, or an identity) behind a SHA-256 digest now
//! and prove it later by revealing the preimage.
//!
//! Each kind of commitment hashes under its own domain separator, so an
//! action commitment can never be replayed as a position commitment.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::core::geometry::Position;
use crate::core::hash::{hash_with_domain, StateHash, StateHasher, short_hex};
use crate::game::identity::PlayerId;

/// Domain separator for (values, salt) commitments.
const ACTION_DOMAIN: &[u8] = b"DUEL_ARBITER_COMMIT_V1";

/// Domain separator for position commitments.
const POSITION_DOMAIN: &[u8] = b"DUEL_ARBITER_POSITION_V1";

/// Domain separator for participant identity commitments.
const IDENTITY_DOMAIN: &[u8] = b"DUEL_ARBITER_IDENTITY_V1";

/// One-way binding of a hidden value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Commitment(pub StateHash);

impl Commitment {
    /// All-zero digest. State uses `Option<Commitment>` for "nothing
    /// committed"; this constant only exists for display and interop.
    pub const ZERO: Self = Self([0; 32]);

    /// Commit to an ordered tuple of values and a salt.
    pub fn commit(values: &[i64], salt: u64) -> Self {
        let mut hasher = StateHasher::new(ACTION_DOMAIN);
        hasher.update_u32(values.len() as u32);
        for value in values {
            hasher.update_i64(*value);
        }
        hasher.update_u64(salt);
        Self(hasher.finalize())
    }

    /// Commit to a single numpad choice.
    #[inline]
    pub fn of_choice(code: u8, salt: u64) -> Self {
        Self::commit(&[code as i64], salt)
    }

    /// Commit to a grid position.
    pub fn of_position(position: Position) -> Self {
        let mut hasher = StateHasher::new(POSITION_DOMAIN);
        hasher.update_position(position);
        Self(hasher.finalize())
    }

    /// Commit to a participant identity.
    pub fn of_identity(id: &PlayerId) -> Self {
        Self(hash_with_domain(IDENTITY_DOMAIN, id.as_bytes()))
    }

    /// Recompute from a revealed preimage and compare.
    pub fn verify(&self, values: &[i64], salt: u64) -> bool {
        Self::commit(values, salt) == *self
    }

    /// Check a revealed numpad choice.
    #[inline]
    pub fn verify_choice(&self, code: u8, salt: u64) -> bool {
        self.verify(&[code as i64], salt)
    }

    /// Check a revealed position.
    #[inline]
    pub fn verify_position(&self, position: Position) -> bool {
        Self::of_position(position) == *self
    }

    /// Whether this is the all-zero digest.
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &StateHash {
        &self.0
    }
}

/// Commit to `values ++ [salt]`.
pub fn commit(values: &[i64], salt: u64) -> Commitment {
    Commitment::commit(values, salt)
}

/// Verify a commitment against a revealed preimage.
pub fn verify(commitment: &Commitment, values: &[i64], salt: u64) -> bool {
    commitment.verify(values, salt)
}

impl fmt::Debug for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Commitment({})", short_hex(&self.0))
    }
}

impl fmt::Display for Commitment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_commitment_determinism() {
        assert_eq!(commit(&[6], 42069), commit(&[6], 42069));
        assert_eq!(Commitment::of_choice(6, 42069), commit(&[6], 42069));
    }

    #[test]
    fn test_wrong_salt_fails() {
        let c = Commitment::of_choice(6, 42069);
        assert!(c.verify_choice(6, 42069));
        assert!(!c.verify_choice(6, 42070));
        assert!(!c.verify_choice(4, 42069));
    }

    #[test]
    fn test_tuple_length_is_bound() {
        // [1, 2] with salt 3 must differ from [1, 2, 3] with any salt layout.
        assert_ne!(commit(&[1, 2], 3), commit(&[1, 2, 3], 0));
        assert_ne!(commit(&[], 0), commit(&[0], 0));
    }

    #[test]
    fn test_domains_do_not_overlap() {
        let p = Position::new(3, 5);
        assert_ne!(Commitment::of_position(p), commit(&[3, 5], 0));
        assert!(Commitment::of_position(p).verify_position(p));
        assert!(!Commitment::of_position(p).verify_position(Position::new(5, 3)));

        let id = PlayerId::new([7; 16]);
        assert_ne!(Commitment::of_identity(&id), Commitment::of_identity(&PlayerId::new([8; 16])));
    }

    #[test]
    fn test_identity_is_domain_hash_of_id() {
        let id = PlayerId::new([7; 16]);
        assert_eq!(
            Commitment::of_identity(&id).0,
            hash_with_domain(b"DUEL_ARBITER_IDENTITY_V1", &[7; 16])
        );
        assert_ne!(Commitment::of_identity(&id).0, hash_with_domain(b"DUEL_ARBITER_POSITION_V1", &[7; 16]));
    }

    #[test]
    fn test_zero_sentinel() {
        assert!(Commitment::ZERO.is_zero());
        assert!(!commit(&[0], 0).is_zero());
    }

    #[test]
    fn test_display_formats() {
        let c = Commitment([0xCD; 32]);
        assert_eq!(format!("{:?}", c), "Commitment(cdcdcdcd)");
        assert_eq!(format!("{}", c).len(), 64);
    }

    proptest! {
        #[test]
        fn prop_commit_verify_round_trip(value in any::<i64>(), salt in any::<u64>()) {
            let c = commit(&[value], salt);
            prop_assert!(verify(&c, &[value], salt));
        }

        #[test]
        fn prop_altered_preimage_fails(
            value in any::<i64>(),
            salt in any::<u64>(),
            dv in 1i64..1000,
            ds in 1u64..1000,
        ) {
            let c = commit(&[value], salt);
            prop_assert!(!verify(&c, &[value.wrapping_add(dv)], salt));
            prop_assert!(!verify(&c, &[value], salt.wrapping_add(ds)));
        }
    }
}
