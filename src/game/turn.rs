//! Turn State Machine
//!
//! A round is a fixed sequence of phases, one reveal per phase, closed by
//! round completion. The sub-tick is the cursor into that sequence:
//!
//! ```text
//!  sub_tick   0          1          2            3            4
//!           P1 move -> P2 move -> P1 attack -> P2 attack -> complete
//!              ^                                               |
//!              └────────────── game_tick += 1 ─────────────────┘
//! ```
//!
//! The order is configurable; the phase count is not, since every reveal
//! advances the cursor exactly once.

use std::fmt;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::error::SequenceError;
use crate::game::identity::Seat;

/// Number of phases in a round.
pub const PHASES_PER_ROUND: usize = 5;

/// One step of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Waiting for this seat's move reveal
    Move(Seat),
    /// Waiting for this seat's attack reveal
    Attack(Seat),
    /// Waiting for round completion
    Complete,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Move(seat) => write!(f, "await-{}-move", seat),
            Phase::Attack(seat) => write!(f, "await-{}-attack", seat),
            Phase::Complete => write!(f, "round-complete-pending"),
        }
    }
}

/// Malformed round schedule.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Wrong number of phases.
    #[error("schedule needs 5 phases, got {0}")]
    WrongLength(usize),
    /// A phase appears twice.
    #[error("phase {0} appears more than once")]
    Duplicate(Phase),
    /// Completion is not the final phase.
    #[error("round completion must be the last phase")]
    CompleteNotLast,
}

/// Phase order of a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Phase>", into = "Vec<Phase>")]
pub struct RoundSchedule {
    phases: [Phase; PHASES_PER_ROUND],
}

impl Default for RoundSchedule {
    fn default() -> Self {
        Self::standard()
    }
}

impl RoundSchedule {
    /// Two-mover cycle: both moves, then both attacks, P1 first each time.
    pub const fn standard() -> Self {
        Self {
            phases: [
                Phase::Move(Seat::P1),
                Phase::Move(Seat::P2),
                Phase::Attack(Seat::P1),
                Phase::Attack(Seat::P2),
                Phase::Complete,
            ],
        }
    }

    /// Build from an explicit order.
    ///
    /// Each seat's move and attack must appear exactly once, with completion
    /// last.
    pub fn new(phases: Vec<Phase>) -> Result<Self, ScheduleError> {
        let phases: [Phase; PHASES_PER_ROUND] = phases
            .try_into()
            .map_err(|v: Vec<Phase>| ScheduleError::WrongLength(v.len()))?;

        for (i, phase) in phases.iter().enumerate() {
            if phases[..i].contains(phase) {
                return Err(ScheduleError::Duplicate(*phase));
            }
        }
        if phases[PHASES_PER_ROUND - 1] != Phase::Complete {
            return Err(ScheduleError::CompleteNotLast);
        }

        Ok(Self { phases })
    }

    /// Phases in order.
    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    /// Phase the cursor points at, if in range.
    pub fn phase_at(&self, sub_tick: u8) -> Option<Phase> {
        self.phases.get(sub_tick as usize).copied()
    }

    /// Sub-tick at which `phase` is accepted.
    pub fn sub_tick_of(&self, phase: Phase) -> u8 {
        // Construction guarantees every phase is present.
        self.phases
            .iter()
            .position(|p| *p == phase)
            .unwrap_or(PHASES_PER_ROUND - 1) as u8
    }

    /// Highest valid sub-tick.
    pub fn last_sub_tick(&self) -> u8 {
        (PHASES_PER_ROUND - 1) as u8
    }

    /// Fail unless the cursor is at `phase`.
    pub fn require(&self, sub_tick: u8, phase: Phase) -> Result<(), SequenceError> {
        let expected = self.sub_tick_of(phase);
        if sub_tick != expected {
            return Err(SequenceError::SubTick { expected, found: sub_tick });
        }
        Ok(())
    }

    /// Cursor after `sub_tick` is accepted, and whether the round closed.
    pub fn advance(&self, sub_tick: u8) -> (u8, bool) {
        if sub_tick >= self.last_sub_tick() {
            (0, true)
        } else {
            (sub_tick + 1, false)
        }
    }
}

impl TryFrom<Vec<Phase>> for RoundSchedule {
    type Error = ScheduleError;

    fn try_from(phases: Vec<Phase>) -> Result<Self, Self::Error> {
        Self::new(phases)
    }
}

impl From<RoundSchedule> for Vec<Phase> {
    fn from(schedule: RoundSchedule) -> Self {
        schedule.phases.to_vec()
    }
}

/// Fail unless an agent's action tick belongs to the round in progress.
pub fn require_round_binding(action_tick: u64, game_tick: u64) -> Result<(), SequenceError> {
    let expected = game_tick + 1;
    if action_tick != expected {
        return Err(SequenceError::ActionTick { expected, found: action_tick });
    }
    Ok(())
}
