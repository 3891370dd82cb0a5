//! Game Logic Module
//!
//! The duel rules. Nothing here does I/O; the service layer loads and
//! stores the two entity kinds defined here.
//!
//! ## Module Structure
//!
//! - `identity`: Player, match and seat identifiers
//! - `agent`: Per-player commitments and round counters
//! - `arbiter`: Shared match state and the reveal operations
//! - `turn`: Round schedule and sub-tick cursor
//! - `attack`: Attack shapes and damage
//! - `config`: Match rules
//! - `events`: Events emitted by accepted transitions
//! - `error`: Error taxonomy

pub mod agent;
pub mod arbiter;
pub mod attack;
pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod turn;

// Re-export key types
pub use agent::PlayerAgent;
pub use arbiter::{ArbiterState, MatchArbiter, SeatState};
pub use attack::{AttackShape, ResolvedAttack};
pub use config::{HealthGuard, MatchConfig};
pub use error::{ArbiterError, ErrorKind, InvalidInput, SequenceError, StateField};
pub use events::{ArbiterEvent, ArbiterEventData, MatchOutcome};
pub use identity::{MatchId, PlayerId, Seat};
pub use turn::{Phase, RoundSchedule};
