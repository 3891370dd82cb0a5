//! Player Client
//!
//! Keeps the secrets a participant must never hand to anyone before the
//! reveal: plaintext position, the round's choices and the salt. Salts come
//! from a seedable `StdRng` so tests can replay a match exactly.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::core::geometry::{is_cardinal_code, DirectionVector, Position};
use crate::game::error::{InvalidInput, Result, SequenceError, StateField};
use crate::game::identity::{PlayerId, Seat};
use crate::service::auth::Authorizer;
use crate::service::session::MatchService;
use crate::service::store::StateStore;

/// Choices for one round, kept until revealed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlannedTurn {
    /// Numpad move code
    pub move_code: u8,
    /// Cardinal attack code
    pub attack_code: u8,
    /// Salt shared by both commitments
    pub salt: u64,
}

/// One participant's side of the match.
pub struct PlayerClient {
    player: PlayerId,
    seat: Seat,
    position: Position,
    planned: Option<PlannedTurn>,
    rng: StdRng,
}

impl PlayerClient {
    /// Client seeded from OS entropy.
    pub fn new(player: PlayerId, seat: Seat, start: Position) -> Self {
        Self::with_rng(player, seat, start, StdRng::from_entropy())
    }

    /// Client with reproducible salts.
    pub fn seeded(player: PlayerId, seat: Seat, start: Position, seed: u64) -> Self {
        Self::with_rng(player, seat, start, StdRng::seed_from_u64(seed))
    }

    fn with_rng(player: PlayerId, seat: Seat, start: Position, rng: StdRng) -> Self {
        Self {
            player,
            seat,
            position: start,
            planned: None,
            rng,
        }
    }

    /// Participant.
    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Seat played.
    pub fn seat(&self) -> Seat {
        self.seat
    }

    /// Plaintext position as of the last accepted move.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Choices awaiting reveal.
    pub fn planned(&self) -> Option<PlannedTurn> {
        self.planned
    }

    /// Pick this round's choices and draw a fresh salt.
    pub fn plan(&mut self, move_code: u8, attack_code: u8) -> Result<PlannedTurn> {
        DirectionVector::from_code(move_code).map_err(|_| InvalidInput::InvalidMove { code: move_code })?;
        if !is_cardinal_code(attack_code) {
            return Err(InvalidInput::InvalidAttack { code: attack_code }.into());
        }
        let turn = PlannedTurn { move_code, attack_code, salt: self.rng.gen() };
        self.planned = Some(turn);
        Ok(turn)
    }

    /// Plan and commit through the service.
    pub fn commit<S: StateStore, A: Authorizer>(
        &mut self,
        service: &MatchService<S, A>,
        move_code: u8,
        attack_code: u8,
    ) -> Result<()> {
        let turn = self.plan(move_code, attack_code)?;
        service.commit_actions(&self.player, turn.move_code, turn.attack_code, turn.salt)
    }

    /// Reveal the planned move; tracks the new position on success.
    pub fn reveal_move<S: StateStore, A: Authorizer>(&mut self, service: &MatchService<S, A>) -> Result<Position> {
        let turn = self.require_planned(StateField::PendingMove)?;
        service.reveal_move(&self.player, self.seat, self.position, turn.move_code, turn.salt)?;

        let direction = DirectionVector::from_code(turn.move_code)?;
        self.position = self.position.step(direction)?;
        debug!(player = %self.player.short(), seat = %self.seat, "move accepted");
        Ok(self.position)
    }

    /// Reveal the planned attack against the opponent at `opponent`.
    pub fn reveal_attack<S: StateStore, A: Authorizer>(
        &mut self,
        service: &MatchService<S, A>,
        opponent: Position,
    ) -> Result<()> {
        let turn = self.require_planned(StateField::PendingAttack)?;
        service.reveal_attack(&self.player, self.seat, self.position, opponent, turn.attack_code, turn.salt)?;
        self.planned = None;
        Ok(())
    }

    /// Catch the agent up after a round closes.
    pub fn sync<S: StateStore, A: Authorizer>(&self, service: &MatchService<S, A>) -> Result<()> {
        service.sync_game_tick(&self.player)
    }

    fn require_planned(&self, field: StateField) -> Result<PlannedTurn> {
        Ok(self.planned.ok_or(SequenceError::NotInitialized { field })?)
    }
}
