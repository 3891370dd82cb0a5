//! Match Arbiter
//!
//! The shared authoritative state of a duel: who the two participants are,
//! where they are (hidden behind commitments), how much health they have,
//! and where the round cursor stands.
//!
//! Fields are private. State changes only through the eight operations
//! below; each one checks every precondition before touching anything, so
//! a rejected call leaves the arbiter exactly as it was.
//!
//! ```text
//! instantiate_identities ─┐
//! instantiate_positions  ─┼─> reveal_move(P1) -> reveal_move(P2)
//! instantiate_health     ─┘       -> reveal_attack(P1) -> reveal_attack(P2)
//!                                 -> complete_round ─> (next round)
//! ```

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::geometry::{is_cardinal_code, DirectionVector, Position};
use crate::core::hash::{StateHash, StateHasher, short_hex};
use crate::game::agent::PlayerAgent;
use crate::game::config::{HealthGuard, MatchConfig};
use crate::game::error::{ArbiterError, InvalidInput, Result, SequenceError, StateField};
use crate::game::events::{ArbiterEvent, ArbiterEventData, MatchOutcome};
use crate::game::identity::{MatchId, Seat};
use crate::game::turn::{require_round_binding, Phase};
use crate::proof::commitment::Commitment;
use crate::service::auth::Role;
use crate::service::store::{EntityKey, FieldKey, FieldValue, Record, StoreError};

// =============================================================================
// PERSISTED STATE
// =============================================================================

/// Per-seat slice of the match.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatState {
    /// Participant identity commitment (set once)
    pub identity: Option<Commitment>,
    /// Current position commitment
    pub position: Option<Commitment>,
    /// Remaining health (0 until instantiated)
    pub health: u32,
}

/// Everything the store keeps for a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbiterState {
    /// Match identifier
    pub match_id: MatchId,
    /// P1 then P2
    pub seats: [SeatState; 2],
    /// Completed rounds
    pub game_tick: u64,
    /// Phase cursor within the round
    pub sub_tick: u8,
    /// Set once a player reaches zero health
    pub outcome: Option<MatchOutcome>,
}

impl ArbiterState {
    /// Blank match: nothing committed, health unset, cursor at zero.
    pub fn new(match_id: MatchId) -> Self {
        Self {
            match_id,
            seats: Default::default(),
            game_tick: 0,
            sub_tick: 0,
            outcome: None,
        }
    }
}

impl Record for ArbiterState {
    fn key(&self) -> EntityKey {
        EntityKey::Arbiter(self.match_id)
    }

    fn to_fields(&self) -> Vec<(FieldKey, FieldValue)> {
        let mut fields = vec![(FieldKey::MatchId, FieldValue::Match(Some(self.match_id)))];
        for seat in Seat::ALL {
            let s = &self.seats[seat.index()];
            fields.push((FieldKey::Identity(seat), FieldValue::Commitment(s.identity)));
            fields.push((FieldKey::Position(seat), FieldValue::Commitment(s.position)));
            fields.push((FieldKey::Health(seat), FieldValue::Health(s.health)));
        }
        fields.push((FieldKey::GameTick, FieldValue::Counter(self.game_tick)));
        fields.push((FieldKey::SubTick, FieldValue::SubTick(self.sub_tick)));
        fields.push((FieldKey::Outcome, FieldValue::Outcome(self.outcome)));
        fields
    }

    fn from_fields<F>(mut read: F) -> std::result::Result<Self, StoreError>
    where
        F: FnMut(FieldKey) -> std::result::Result<FieldValue, StoreError>,
    {
        let match_id = read(FieldKey::MatchId)?
            .into_match(FieldKey::MatchId)?
            .ok_or(StoreError::TypeMismatch { field: FieldKey::MatchId })?;

        let mut seats: [SeatState; 2] = Default::default();
        for seat in Seat::ALL {
            seats[seat.index()] = SeatState {
                identity: read(FieldKey::Identity(seat))?.into_commitment(FieldKey::Identity(seat))?,
                position: read(FieldKey::Position(seat))?.into_commitment(FieldKey::Position(seat))?,
                health: read(FieldKey::Health(seat))?.into_health(FieldKey::Health(seat))?,
            };
        }

        Ok(Self {
            match_id,
            seats,
            game_tick: read(FieldKey::GameTick)?.into_counter(FieldKey::GameTick)?,
            sub_tick: read(FieldKey::SubTick)?.into_sub_tick(FieldKey::SubTick)?,
            outcome: read(FieldKey::Outcome)?.into_outcome(FieldKey::Outcome)?,
        })
    }
}

// =============================================================================
// ARBITER
// =============================================================================

/// Match state plus the rules it is played under.
#[derive(Clone, Debug)]
pub struct MatchArbiter {
    config: MatchConfig,
    state: ArbiterState,
    events: Vec<ArbiterEvent>,
}

impl MatchArbiter {
    /// New match under `config`.
    pub fn new(match_id: MatchId, config: MatchConfig) -> Self {
        Self::from_state(ArbiterState::new(match_id), config)
    }

    /// Resume from stored state.
    pub fn from_state(state: ArbiterState, config: MatchConfig) -> Self {
        Self {
            config,
            state,
            events: Vec::new(),
        }
    }

    // =========================================================================
    // Read access
    // =========================================================================

    /// Match identifier.
    pub fn match_id(&self) -> MatchId {
        self.state.match_id
    }

    /// Rules in force.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Persisted state.
    pub fn state(&self) -> &ArbiterState {
        &self.state
    }

    /// Completed rounds.
    pub fn game_tick(&self) -> u64 {
        self.state.game_tick
    }

    /// Phase cursor.
    pub fn sub_tick(&self) -> u8 {
        self.state.sub_tick
    }

    /// Phase the cursor points at.
    pub fn current_phase(&self) -> Phase {
        self.config
            .schedule
            .phase_at(self.state.sub_tick)
            .unwrap_or(Phase::Complete)
    }

    /// A seat's health.
    pub fn health(&self, seat: Seat) -> u32 {
        self.seat(seat).health
    }

    /// A seat's position commitment.
    pub fn position_commitment(&self, seat: Seat) -> Option<Commitment> {
        self.seat(seat).position
    }

    /// A seat's identity commitment.
    pub fn identity_commitment(&self, seat: Seat) -> Option<Commitment> {
        self.seat(seat).identity
    }

    /// Result, once a player is down.
    pub fn outcome(&self) -> Option<MatchOutcome> {
        self.state.outcome
    }

    /// Whether the match has ended.
    pub fn is_over(&self) -> bool {
        self.state.outcome.is_some()
    }

    /// Drain events produced by accepted transitions.
    pub fn take_events(&mut self) -> Vec<ArbiterEvent> {
        std::mem::take(&mut self.events)
    }

    /// Digest of all public state.
    ///
    /// Two parties holding the same digest agree on every field.
    pub fn state_hash(&self) -> StateHash {
        let mut hasher = StateHasher::for_arbiter_state();
        hasher.update_bytes(&self.state.match_id.0);
        for seat in Seat::ALL {
            let s = self.seat(seat);
            hasher.update_optional(s.identity.as_ref().map(Commitment::as_bytes));
            hasher.update_optional(s.position.as_ref().map(Commitment::as_bytes));
            hasher.update_u32(s.health);
        }
        hasher.update_u64(self.state.game_tick);
        hasher.update_u8(self.state.sub_tick);
        match self.state.outcome {
            Some(outcome) => {
                hasher.update_bool(true);
                hasher.update_u8(outcome.winner as u8);
                hasher.update_u64(outcome.game_tick);
            }
            None => hasher.update_bool(false),
        }
        hasher.finalize()
    }

    // =========================================================================
    // One-shot setup
    // =========================================================================

    /// Record both participants. Each agent must have joined this match.
    pub fn instantiate_identities(&mut self, p1: &PlayerAgent, p2: &PlayerAgent) -> Result<()> {
        for seat in Seat::ALL {
            if self.seat(seat).identity.is_some() {
                return Err(ArbiterError::AlreadySet { field: StateField::Identity(seat) });
            }
        }
        for (seat, agent) in [(Seat::P1, p1), (Seat::P2, p2)] {
            if agent.match_id() != Some(self.state.match_id) {
                return Err(ArbiterError::Unauthorized { role: Role::for_seat(seat) });
            }
        }
        if p1.owner() == p2.owner() {
            return Err(ArbiterError::Unauthorized { role: Role::Player2 });
        }

        self.seat_mut(Seat::P1).identity = Some(p1.identity_commitment());
        self.seat_mut(Seat::P2).identity = Some(p2.identity_commitment());

        info!(
            match_id = %self.state.match_id.short(),
            p1 = %p1.owner().short(),
            p2 = %p2.owner().short(),
            "identities bound"
        );
        self.emit(ArbiterEventData::IdentitiesBound);
        Ok(())
    }

    /// Commit both starting positions.
    pub fn instantiate_positions(&mut self, p1: Position, p2: Position) -> Result<()> {
        for seat in Seat::ALL {
            if self.seat(seat).position.is_some() {
                return Err(ArbiterError::AlreadySet { field: StateField::Position(seat) });
            }
        }
        self.place(Seat::P1, p1);
        self.place(Seat::P2, p2);
        Ok(())
    }

    /// Commit one seat's starting position.
    pub fn instantiate_position(&mut self, seat: Seat, position: Position) -> Result<()> {
        if self.seat(seat).position.is_some() {
            return Err(ArbiterError::AlreadySet { field: StateField::Position(seat) });
        }
        self.place(seat, position);
        Ok(())
    }

    /// Give both seats `value` health.
    pub fn instantiate_health(&mut self, value: u32) -> Result<()> {
        if value == 0 {
            return Err(InvalidInput::InvalidHealth { value }.into());
        }
        for seat in Seat::ALL {
            if self.seat(seat).health != 0 {
                return Err(ArbiterError::AlreadySet { field: StateField::Health(seat) });
            }
        }
        for seat in Seat::ALL {
            self.seat_mut(seat).health = value;
        }
        self.emit(ArbiterEventData::HealthSet { value });
        Ok(())
    }

    /// Give both seats the configured starting health.
    pub fn instantiate_starting_health(&mut self) -> Result<()> {
        self.instantiate_health(self.config.starting_health)
    }

    // =========================================================================
    // Reveals
    // =========================================================================

    /// Apply a seat's committed move.
    ///
    /// `current` is the seat's position in plaintext; it must match the
    /// stored commitment. The new position is stored committed.
    pub fn reveal_move(
        &mut self,
        seat: Seat,
        agent: &PlayerAgent,
        current: Position,
        move_code: u8,
        salt: u64,
    ) -> Result<()> {
        self.require_turn(Phase::Move(seat))?;
        self.require_agent(seat, agent)?;
        self.require_position(seat, current)?;

        let direction = DirectionVector::from_code(move_code)?;
        agent.verify_move(move_code, salt)?;

        let moved = current.step(direction)?;
        let commitment = Commitment::of_position(moved);
        self.seat_mut(seat).position = Some(commitment);

        debug!(
            match_id = %self.state.match_id.short(),
            seat = %seat,
            position = %short_hex(commitment.as_bytes()),
            "move revealed"
        );
        self.emit(ArbiterEventData::Moved { seat, position: commitment });
        self.advance();
        Ok(())
    }

    /// Resolve a seat's committed attack against the opponent.
    ///
    /// Both positions are supplied in plaintext and checked against their
    /// commitments.
    pub fn reveal_attack(
        &mut self,
        seat: Seat,
        agent: &PlayerAgent,
        own: Position,
        opponent: Position,
        attack_code: u8,
        salt: u64,
    ) -> Result<()> {
        let target = seat.opponent();

        self.require_turn(Phase::Attack(seat))?;
        self.require_agent(seat, agent)?;
        self.require_position(seat, own)?;
        self.require_position(target, opponent)?;

        if !is_cardinal_code(attack_code) {
            return Err(InvalidInput::InvalidAttack { code: attack_code }.into());
        }
        agent.verify_attack(attack_code, salt)?;

        let attack = self.config.attack_shape.resolve(
            own,
            attack_code,
            self.config.attack_range,
            self.config.attack_damage,
        )?;
        let hit = attack.hits(opponent);
        let health = self.seat(target).health;

        let new_health = match self.config.health_guard {
            HealthGuard::RejectBelowDamage => {
                if health < attack.damage {
                    return Err(SequenceError::InsufficientHealth {
                        seat: target,
                        health,
                        damage: attack.damage,
                    }
                    .into());
                }
                if hit { health - attack.damage } else { health }
            }
            HealthGuard::SaturateOnHit => {
                if hit { health.saturating_sub(attack.damage) } else { health }
            }
        };

        self.seat_mut(target).health = new_health;

        debug!(
            match_id = %self.state.match_id.short(),
            attacker = %seat,
            hit,
            target_health = new_health,
            "attack revealed"
        );
        self.emit(ArbiterEventData::AttackResolved {
            attacker: seat,
            hit,
            damage: if hit { health - new_health } else { 0 },
            target_health: new_health,
        });

        if new_health == 0 {
            let outcome = MatchOutcome { winner: seat, game_tick: self.state.game_tick };
            self.state.outcome = Some(outcome);
            info!(match_id = %self.state.match_id.short(), winner = %seat, "match ended");
            self.emit(ArbiterEventData::MatchEnded { outcome });
        }

        self.advance();
        Ok(())
    }

    /// Close the round and start the next one.
    pub fn complete_round(&mut self) -> Result<()> {
        self.require_turn(Phase::Complete)?;
        self.advance();
        info!(
            match_id = %self.state.match_id.short(),
            game_tick = self.state.game_tick,
            "round completed"
        );
        Ok(())
    }

    /// `reveal_move` for P1.
    pub fn reveal_p1_move(&mut self, agent: &PlayerAgent, current: Position, move_code: u8, salt: u64) -> Result<()> {
        self.reveal_move(Seat::P1, agent, current, move_code, salt)
    }

    /// `reveal_move` for P2.
    pub fn reveal_p2_move(&mut self, agent: &PlayerAgent, current: Position, move_code: u8, salt: u64) -> Result<()> {
        self.reveal_move(Seat::P2, agent, current, move_code, salt)
    }

    /// `reveal_attack` for P1.
    pub fn reveal_p1_attack(
        &mut self,
        agent: &PlayerAgent,
        p1: Position,
        p2: Position,
        attack_code: u8,
        salt: u64,
    ) -> Result<()> {
        self.reveal_attack(Seat::P1, agent, p1, p2, attack_code, salt)
    }

    /// `reveal_attack` for P2.
    pub fn reveal_p2_attack(
        &mut self,
        agent: &PlayerAgent,
        p1: Position,
        p2: Position,
        attack_code: u8,
        salt: u64,
    ) -> Result<()> {
        self.reveal_attack(Seat::P2, agent, p2, p1, attack_code, salt)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn seat(&self, seat: Seat) -> &SeatState {
        &self.state.seats[seat.index()]
    }

    fn seat_mut(&mut self, seat: Seat) -> &mut SeatState {
        &mut self.state.seats[seat.index()]
    }

    fn place(&mut self, seat: Seat, position: Position) {
        self.seat_mut(seat).position = Some(Commitment::of_position(position));
        self.emit(ArbiterEventData::PositionPlaced { seat });
    }

    fn emit(&mut self, data: ArbiterEventData) {
        let event = ArbiterEvent::new(self.state.game_tick, self.state.sub_tick, data);
        self.events.push(event);
    }

    /// Match still running, setup done, cursor at `phase`.
    fn require_turn(&self, phase: Phase) -> Result<()> {
        if self.is_over() {
            return Err(SequenceError::MatchOver.into());
        }
        for seat in Seat::ALL {
            let s = self.seat(seat);
            if s.identity.is_none() {
                return Err(SequenceError::NotInitialized { field: StateField::Identity(seat) }.into());
            }
            if s.position.is_none() {
                return Err(SequenceError::NotInitialized { field: StateField::Position(seat) }.into());
            }
            if s.health == 0 {
                return Err(SequenceError::NotInitialized { field: StateField::Health(seat) }.into());
            }
        }
        self.config.schedule.require(self.state.sub_tick, phase)?;
        Ok(())
    }

    /// Agent is the seat's participant and committed for this round.
    fn require_agent(&self, seat: Seat, agent: &PlayerAgent) -> Result<()> {
        if self.seat(seat).identity != Some(agent.identity_commitment()) {
            return Err(ArbiterError::CommitmentMismatch { field: StateField::Identity(seat) });
        }
        require_round_binding(agent.action_tick(), self.state.game_tick)?;
        Ok(())
    }

    fn require_position(&self, seat: Seat, position: Position) -> Result<()> {
        let matches = self
            .seat(seat)
            .position
            .is_some_and(|c| c.verify_position(position));
        if !matches {
            return Err(ArbiterError::CommitmentMismatch { field: StateField::Position(seat) });
        }
        Ok(())
    }

    fn advance(&mut self) {
        let (next, round_closed) = self.config.schedule.advance(self.state.sub_tick);
        self.state.sub_tick = next;
        if round_closed {
            self.state.game_tick += 1;
            self.emit(ArbiterEventData::RoundCompleted { game_tick: self.state.game_tick });
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            sub_tick = self.state.sub_tick,
            game_tick = self.state.game_tick,
            state_hash = %short_hex(&self.state_hash()),
            "cursor advanced"
        );
    }
}

// =============================================================================
// TESTS
// =============================================================================
