//! Commit-Reveal Proofs
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    COMMIT / REVEAL                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  commit:  H(domain | len | values | salt)  -> stored        │
//! │  reveal:  (values, salt)                    -> recomputed   │
//! │  accept:  recomputed == stored                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod commitment;

pub use commitment::{Commitment, commit, verify};
