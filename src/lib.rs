//! # Duel Arbiter
//!
//! Commit-reveal turn arbiter for a two-player duel on a hidden grid.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DUEL ARBITER                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── geometry.rs  - Numpad directions, positions, surfaces   │
//! │  └── hash.rs      - Domain-separated state hashing           │
//! │                                                              │
//! │  proof/           - Commit / reveal                          │
//! │  └── commitment.rs- Salted commitments                       │
//! │                                                              │
//! │  game/            - Rules (deterministic)                    │
//! │  ├── agent.rs     - Per-player commitments and counters      │
//! │  ├── arbiter.rs   - Shared match state and reveals           │
//! │  ├── turn.rs      - Round schedule                           │
//! │  └── attack.rs    - Attack shapes                            │
//! │                                                              │
//! │  service/         - Callers and storage (non-deterministic)  │
//! │  ├── auth.rs      - JWT identity and role checks             │
//! │  ├── store.rs     - Versioned field store                    │
//! │  ├── session.rs   - Load / apply / save / broadcast          │
//! │  └── client.rs    - Player-side secrets and salts            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Round
//!
//! Each player commits `H(move, salt)` and `H(attack, salt)` to their own
//! agent. The arbiter then accepts, in order, P1's move reveal, P2's move
//! reveal, P1's attack reveal, P2's attack reveal and the round close.
//! Positions stay hidden behind commitments between reveals.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod proof;
pub mod service;

// Re-export commonly used types
pub use core::geometry::{DirectionVector, Position};
pub use proof::commitment::Commitment;
pub use game::agent::PlayerAgent;
pub use game::arbiter::MatchArbiter;
pub use game::config::MatchConfig;
pub use game::error::{ArbiterError, ErrorKind};
pub use game::identity::{MatchId, PlayerId, Seat};
pub use service::session::MatchService;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
