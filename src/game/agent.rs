//! Player Agent
//!
//! Per-player state owned by that player's controller: the hidden move and
//! attack for the coming round, plus the counters that tie those commitments
//! to a specific round of the match.
//!
//! The arbiter only ever reads an agent. Nothing here writes arbiter state.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::core::geometry::is_cardinal_code;
use crate::game::arbiter::MatchArbiter;
use crate::game::error::{ArbiterError, InvalidInput, Result, SequenceError, StateField};
use crate::game::identity::{MatchId, PlayerId};
use crate::proof::commitment::Commitment;
use crate::service::store::{EntityKey, FieldKey, FieldValue, Record, StoreError};

/// A player's commitment holder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerAgent {
    owner: PlayerId,
    match_id: Option<MatchId>,
    pending_move: Option<Commitment>,
    pending_attack: Option<Commitment>,
    action_tick: u64,
    game_tick_mirror: u64,
}

impl PlayerAgent {
    /// Fresh agent with nothing committed.
    pub fn new(owner: PlayerId) -> Self {
        Self {
            owner,
            match_id: None,
            pending_move: None,
            pending_attack: None,
            action_tick: 0,
            game_tick_mirror: 0,
        }
    }

    // =========================================================================
    // Controller operations
    // =========================================================================

    /// Bind this agent to a match. One-shot.
    pub fn join_match(&mut self, match_id: MatchId) -> Result<()> {
        if self.match_id.is_some() {
            return Err(ArbiterError::AlreadySet { field: StateField::MatchBinding });
        }
        self.match_id = Some(match_id);
        debug!(owner = %self.owner.short(), match_id = %match_id.short(), "agent joined match");
        Ok(())
    }

    /// Commit the move and attack for the round the agent last observed.
    pub fn set_pending_actions(&mut self, move_code: u8, attack_code: u8, salt: u64) -> Result<()> {
        if self.match_id.is_none() {
            return Err(SequenceError::NotInitialized { field: StateField::MatchBinding }.into());
        }
        if self.action_tick != self.game_tick_mirror {
            return Err(SequenceError::AlreadyCommitted { action_tick: self.action_tick }.into());
        }
        if !(1..=9).contains(&move_code) {
            return Err(InvalidInput::InvalidMove { code: move_code }.into());
        }
        if !is_cardinal_code(attack_code) {
            return Err(InvalidInput::InvalidAttack { code: attack_code }.into());
        }

        let hidden_move = Commitment::of_choice(move_code, salt);
        let hidden_attack = Commitment::of_choice(attack_code, salt);

        self.pending_move = Some(hidden_move);
        self.pending_attack = Some(hidden_attack);
        self.action_tick += 1;

        debug!(
            owner = %self.owner.short(),
            action_tick = self.action_tick,
            pending_move = ?hidden_move,
            "actions committed"
        );
        Ok(())
    }

    /// Catch up with a completed round so the next commit is allowed.
    ///
    /// The arbiter must be exactly one round ahead of the mirror.
    pub fn sync_game_tick(&mut self, arbiter: &MatchArbiter) -> Result<()> {
        let found = arbiter.game_tick();
        let expected = self.game_tick_mirror + 1;
        if found != expected {
            return Err(SequenceError::GameTick { expected, found }.into());
        }
        self.game_tick_mirror = found;
        Ok(())
    }

    // =========================================================================
    // Read-only view for the arbiter
    // =========================================================================

    /// Participant identity.
    pub fn owner(&self) -> PlayerId {
        self.owner
    }

    /// Commitment to the owner identity, as the arbiter records it.
    pub fn identity_commitment(&self) -> Commitment {
        Commitment::of_identity(&self.owner)
    }

    /// Bound match, if any.
    pub fn match_id(&self) -> Option<MatchId> {
        self.match_id
    }

    /// Committed move.
    pub fn pending_move(&self) -> Option<Commitment> {
        self.pending_move
    }

    /// Committed attack.
    pub fn pending_attack(&self) -> Option<Commitment> {
        self.pending_attack
    }

    /// Number of commits made so far.
    pub fn action_tick(&self) -> u64 {
        self.action_tick
    }

    /// Last game tick this agent observed.
    pub fn game_tick_mirror(&self) -> u64 {
        self.game_tick_mirror
    }

    /// Whether a commit is currently allowed.
    pub fn can_commit(&self) -> bool {
        self.match_id.is_some() && self.action_tick == self.game_tick_mirror
    }

    /// Check a revealed move against the pending commitment.
    pub fn verify_move(&self, move_code: u8, salt: u64) -> Result<()> {
        verify_pending(self.pending_move, StateField::PendingMove, move_code, salt)
    }

    /// Check a revealed attack against the pending commitment.
    pub fn verify_attack(&self, attack_code: u8, salt: u64) -> Result<()> {
        verify_pending(self.pending_attack, StateField::PendingAttack, attack_code, salt)
    }
}

fn verify_pending(pending: Option<Commitment>, field: StateField, code: u8, salt: u64) -> Result<()> {
    let commitment = pending.ok_or(SequenceError::NotInitialized { field })?;
    if !commitment.verify_choice(code, salt) {
        return Err(ArbiterError::CommitmentMismatch { field });
    }
    Ok(())
}

impl Record for PlayerAgent {
    fn key(&self) -> EntityKey {
        EntityKey::Agent(self.owner)
    }

    fn to_fields(&self) -> Vec<(FieldKey, FieldValue)> {
        vec![
            (FieldKey::Owner, FieldValue::Player(self.owner)),
            (FieldKey::MatchBinding, FieldValue::Match(self.match_id)),
            (FieldKey::PendingMove, FieldValue::Commitment(self.pending_move)),
            (FieldKey::PendingAttack, FieldValue::Commitment(self.pending_attack)),
            (FieldKey::ActionTick, FieldValue::Counter(self.action_tick)),
            (FieldKey::GameTickMirror, FieldValue::Counter(self.game_tick_mirror)),
        ]
    }

    fn from_fields<F>(mut read: F) -> std::result::Result<Self, StoreError>
    where
        F: FnMut(FieldKey) -> std::result::Result<FieldValue, StoreError>,
    {
        Ok(Self {
            owner: read(FieldKey::Owner)?.into_player(FieldKey::Owner)?,
            match_id: read(FieldKey::MatchBinding)?.into_match(FieldKey::MatchBinding)?,
            pending_move: read(FieldKey::PendingMove)?.into_commitment(FieldKey::PendingMove)?,
            pending_attack: read(FieldKey::PendingAttack)?.into_commitment(FieldKey::PendingAttack)?,
            action_tick: read(FieldKey::ActionTick)?.into_counter(FieldKey::ActionTick)?,
            game_tick_mirror: read(FieldKey::GameTickMirror)?.into_counter(FieldKey::GameTickMirror)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::error::ErrorKind;

    fn joined_agent() -> PlayerAgent {
        let mut agent = PlayerAgent::new(PlayerId::new([1; 16]));
        agent.join_match(MatchId::new([9; 16])).unwrap();
        agent
    }

    #[test]
    fn test_commit_stores_hashes_and_bumps_tick() {
        let mut agent = joined_agent();
        agent.set_pending_actions(6, 2, 42069).unwrap();

        assert_eq!(agent.action_tick(), 1);
        assert_eq!(agent.pending_move(), Some(Commitment::of_choice(6, 42069)));
        assert_eq!(agent.pending_attack(), Some(Commitment::of_choice(2, 42069)));
        assert!(agent.verify_move(6, 42069).is_ok());
        assert!(agent.verify_attack(2, 42069).is_ok());
        assert!(!agent.can_commit());
    }

    #[test]
    fn test_second_commit_same_round_rejected() {
        let mut agent = joined_agent();
        agent.set_pending_actions(6, 2, 1).unwrap();
        let before = agent.clone();

        let err = agent.set_pending_actions(4, 8, 2).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::OutOfSequence(SequenceError::AlreadyCommitted { action_tick: 1 })
        ));
        assert_eq!(agent, before);
    }

    #[test]
    fn test_invalid_choices_rejected_without_effect() {
        let mut agent = joined_agent();
        let before = agent.clone();

        let err = agent.set_pending_actions(0, 2, 1).unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidInput(InvalidInput::InvalidMove { code: 0 })));
        let err = agent.set_pending_actions(10, 2, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        let err = agent.set_pending_actions(5, 5, 1).unwrap_err();
        assert!(matches!(err, ArbiterError::InvalidInput(InvalidInput::InvalidAttack { code: 5 })));
        let err = agent.set_pending_actions(5, 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(agent, before);
    }

    #[test]
    fn test_commit_requires_match_binding() {
        let mut agent = PlayerAgent::new(PlayerId::new([1; 16]));
        let err = agent.set_pending_actions(6, 2, 1).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::OutOfSequence(SequenceError::NotInitialized { field: StateField::MatchBinding })
        ));
    }

    #[test]
    fn test_join_is_one_shot() {
        let mut agent = joined_agent();
        let err = agent.join_match(MatchId::new([3; 16])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadySet);
        assert_eq!(agent.match_id(), Some(MatchId::new([9; 16])));
    }

    #[test]
    fn test_wrong_reveal_is_mismatch() {
        let mut agent = joined_agent();
        assert!(matches!(
            agent.verify_move(6, 1),
            Err(ArbiterError::OutOfSequence(SequenceError::NotInitialized { .. }))
        ));

        agent.set_pending_actions(6, 2, 42069).unwrap();
        assert!(matches!(
            agent.verify_move(6, 42068),
            Err(ArbiterError::CommitmentMismatch { field: StateField::PendingMove })
        ));
        assert!(matches!(
            agent.verify_attack(4, 42069),
            Err(ArbiterError::CommitmentMismatch { field: StateField::PendingAttack })
        ));
    }

    #[test]
    fn test_record_round_trip() {
        let mut agent = joined_agent();
        agent.set_pending_actions(3, 8, 77).unwrap();

        let fields: std::collections::BTreeMap<_, _> = agent.to_fields().into_iter().collect();
        let restored = PlayerAgent::from_fields(|f| {
            fields.get(&f).cloned().ok_or(StoreError::MissingField { entity: agent.key(), field: f })
        })
        .unwrap();
        assert_eq!(restored, agent);
    }
}
