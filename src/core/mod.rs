//! Core deterministic primitives.
//!
//! Grid geometry and hashing. No I/O, no randomness.

pub mod geometry;
pub mod hash;

// Re-export core types
pub use geometry::{AttackSurface, DirectionVector, Position, DIRECTION_LUT, CARDINAL_CODES};
pub use hash::{StateHash, StateHasher, hash_with_domain};
