//! Match Events
//!
//! Emitted by accepted transitions so clients learn when it is their turn
//! without polling. Plaintext choices and salts never appear here.

use serde::{Serialize, Deserialize};

use crate::game::identity::{PlayerId, Seat};
use crate::proof::commitment::Commitment;

/// How a match ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Seat left standing
    pub winner: Seat,
    /// Round in which the final hit landed
    pub game_tick: u64,
}

/// Event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbiterEventData {
    /// An agent bound itself to the match
    AgentJoined {
        /// Participant owning the agent
        owner: PlayerId,
    },

    /// An agent committed a move/attack pair
    ActionsCommitted {
        /// Participant owning the agent
        owner: PlayerId,
        /// Round the commit is bound to, plus one
        action_tick: u64,
    },

    /// Both participant identities recorded
    IdentitiesBound,

    /// A seat's starting position committed
    PositionPlaced {
        /// Seat placed
        seat: Seat,
    },

    /// Starting health set for both seats
    HealthSet {
        /// Health each seat starts with
        value: u32,
    },

    /// A seat's move applied; its new position stays hidden
    Moved {
        /// Seat that moved
        seat: Seat,
        /// Commitment to the new position
        position: Commitment,
    },

    /// A seat's attack resolved
    AttackResolved {
        /// Seat that attacked
        attacker: Seat,
        /// Whether the opponent stood in the attack surface
        hit: bool,
        /// Damage dealt, zero on a miss
        damage: u32,
        /// Opponent health afterwards
        target_health: u32,
    },

    /// Round closed
    RoundCompleted {
        /// Round now in progress
        game_tick: u64,
    },

    /// A player reached zero health
    MatchEnded {
        /// Winner and final round
        outcome: MatchOutcome,
    },
}

/// An event stamped with the cursor it was produced at.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterEvent {
    /// Round in progress when the event fired
    pub game_tick: u64,
    /// Sub-tick when the event fired
    pub sub_tick: u8,
    /// Event data
    pub data: ArbiterEventData,
}

impl ArbiterEvent {
    /// Create a new event.
    pub fn new(game_tick: u64, sub_tick: u8, data: ArbiterEventData) -> Self {
        Self { game_tick, sub_tick, data }
    }

    /// Seat the event concerns, if any.
    pub fn seat(&self) -> Option<Seat> {
        match &self.data {
            ArbiterEventData::PositionPlaced { seat } => Some(*seat),
            ArbiterEventData::Moved { seat, .. } => Some(*seat),
            ArbiterEventData::AttackResolved { attacker, .. } => Some(*attacker),
            ArbiterEventData::MatchEnded { outcome } => Some(outcome.winner),
            _ => None,
        }
    }
}
