//! Arbiter Errors
//!
//! Every rejected transition surfaces one of these. None are retried
//! internally; `ArbiterError::kind` tells the caller which remediation
//! applies (re-derive the salt, wait for the opponent, resubmit, ...).

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::identity::Seat;
use crate::service::auth::{AuthError, Role};
use crate::service::store::{EntityKey, StoreError};

/// Named piece of match or agent state, used in error reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateField {
    /// Seat identity commitment
    Identity(Seat),
    /// Seat position commitment
    Position(Seat),
    /// Seat health
    Health(Seat),
    /// Agent's committed move
    PendingMove,
    /// Agent's committed attack
    PendingAttack,
    /// Agent's bound match
    MatchBinding,
}

impl fmt::Display for StateField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity(seat) => write!(f, "{} identity", seat),
            Self::Position(seat) => write!(f, "{} position", seat),
            Self::Health(seat) => write!(f, "{} health", seat),
            Self::PendingMove => write!(f, "pending move"),
            Self::PendingAttack => write!(f, "pending attack"),
            Self::MatchBinding => write!(f, "match binding"),
        }
    }
}

/// Malformed caller input.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InvalidInput {
    /// Direction code outside 1-9.
    #[error("invalid direction code {code}")]
    InvalidDirection {
        /// Offending code
        code: u8,
    },
    /// Attack direction is not one of 2, 4, 6, 8.
    #[error("invalid attack direction code {code}")]
    InvalidAttackDirection {
        /// Offending code
        code: u8,
    },
    /// Attack range must be positive.
    #[error("invalid attack range {range}")]
    InvalidRange {
        /// Offending range
        range: u32,
    },
    /// Move choice outside 1-9.
    #[error("invalid move choice {code}")]
    InvalidMove {
        /// Offending code
        code: u8,
    },
    /// Attack choice is not cardinal.
    #[error("invalid attack choice {code}")]
    InvalidAttack {
        /// Offending code
        code: u8,
    },
    /// A step or attack would leave the representable grid.
    #[error("stepping from ({x}, {y}) leaves the grid")]
    OutOfGrid {
        /// X of the starting cell
        x: i64,
        /// Y of the starting cell
        y: i64,
    },
    /// Starting health must be positive.
    #[error("invalid starting health {value}")]
    InvalidHealth {
        /// Offending value
        value: u32,
    },
}

/// Why a transition is not allowed at this point of the match.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SequenceError {
    /// Sub-tick cursor is elsewhere.
    #[error("sub-tick is {found}, operation needs {expected}")]
    SubTick {
        /// Sub-tick the operation requires
        expected: u8,
        /// Current sub-tick
        found: u8,
    },
    /// Agent's commitment does not belong to the current round.
    #[error("action tick is {found}, round needs {expected}")]
    ActionTick {
        /// game_tick + 1
        expected: u64,
        /// Agent's action tick
        found: u64,
    },
    /// Agent already committed for the round it last observed.
    #[error("actions already committed (action tick {action_tick})")]
    AlreadyCommitted {
        /// Agent's action tick
        action_tick: u64,
    },
    /// Agent's game tick mirror is not exactly one round behind.
    #[error("arbiter game tick is {found}, agent expects {expected}")]
    GameTick {
        /// mirror + 1
        expected: u64,
        /// Arbiter's game tick
        found: u64,
    },
    /// Required state has not been instantiated yet.
    #[error("{field} not initialized")]
    NotInitialized {
        /// Missing field
        field: StateField,
    },
    /// Target health is below the damage an attack could deal.
    #[error("{seat} health {health} is below damage {damage}")]
    InsufficientHealth {
        /// Target seat
        seat: Seat,
        /// Current health
        health: u32,
        /// Damage of the attack
        damage: u32,
    },
    /// A player is already at zero health.
    #[error("match is over")]
    MatchOver,
}

/// Errors returned by agent and arbiter transitions.
#[derive(Debug, Error)]
pub enum ArbiterError {
    /// Malformed direction/attack code, range or value.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    /// One-shot field already initialized.
    #[error("{field} already set")]
    AlreadySet {
        /// Field that was already set
        field: StateField,
    },

    /// Sub-tick or action-tick precondition failed.
    #[error("out of sequence: {0}")]
    OutOfSequence(#[from] SequenceError),

    /// Revealed plaintext does not match the stored commitment.
    #[error("{field} does not match its commitment")]
    CommitmentMismatch {
        /// Commitment that failed
        field: StateField,
    },

    /// Bearer token did not identify a caller.
    #[error("authentication failed: {0}")]
    Unauthenticated(#[from] AuthError),

    /// Caller not permitted for the role.
    #[error("caller not authorized as {role}")]
    Unauthorized {
        /// Role that was checked
        role: Role,
    },

    /// A concurrent write won the race.
    #[error("store conflict on {entity}: expected version {expected}, found {found}")]
    StoreConflict {
        /// Entity written
        entity: EntityKey,
        /// Version the transition was computed against
        expected: u64,
        /// Version found at write time
        found: u64,
    },

    /// Store fault other than a conflict.
    #[error("storage error: {0}")]
    Storage(StoreError),
}

/// Coarse classification of [`ArbiterError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Fix the input
    InvalidInput,
    /// Nothing to do, field is final
    AlreadySet,
    /// Wait for the right phase
    OutOfSequence,
    /// Re-derive the salt or plaintext
    CommitmentMismatch,
    /// Use the right identity
    Unauthorized,
    /// Reload and resubmit
    StoreConflict,
    /// Store unavailable or corrupt
    Storage,
}

impl ArbiterError {
    /// Classification for client-side handling.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::AlreadySet { .. } => ErrorKind::AlreadySet,
            Self::OutOfSequence(_) => ErrorKind::OutOfSequence,
            Self::CommitmentMismatch { .. } => ErrorKind::CommitmentMismatch,
            Self::Unauthenticated(_) | Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::StoreConflict { .. } => ErrorKind::StoreConflict,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<StoreError> for ArbiterError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { entity, expected, found } => {
                Self::StoreConflict { entity, expected, found }
            }
            other => Self::Storage(other),
        }
    }
}

/// Result alias for arbiter operations.
pub type Result<T> = std::result::Result<T, ArbiterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_are_distinct() {
        let errors = [
            ArbiterError::from(InvalidInput::InvalidMove { code: 0 }),
            ArbiterError::AlreadySet { field: StateField::Identity(Seat::P1) },
            ArbiterError::from(SequenceError::MatchOver),
            ArbiterError::CommitmentMismatch { field: StateField::PendingMove },
            ArbiterError::Unauthorized { role: Role::Player1 },
        ];
        let kinds: Vec<ErrorKind> = errors.iter().map(|e| e.kind()).collect();
        for (i, a) in kinds.iter().enumerate() {
            for b in &kinds[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_store_conflict_maps_to_conflict_kind() {
        let err = ArbiterError::from(StoreError::Conflict {
            entity: EntityKey::Arbiter(crate::game::identity::MatchId::new([1; 16])),
            expected: 3,
            found: 4,
        });
        assert_eq!(err.kind(), ErrorKind::StoreConflict);

        let err = ArbiterError::from(StoreError::MissingEntity {
            entity: EntityKey::Agent(crate::game::identity::PlayerId::new([2; 16])),
        });
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_messages_carry_detail() {
        let err = ArbiterError::from(SequenceError::SubTick { expected: 0, found: 1 });
        assert_eq!(err.to_string(), "out of sequence: sub-tick is 1, operation needs 0");

        let err = ArbiterError::CommitmentMismatch { field: StateField::Position(Seat::P2) };
        assert_eq!(err.to_string(), "P2 position does not match its commitment");
    }
}
