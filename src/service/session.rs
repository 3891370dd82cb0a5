//! Match Service
//!
//! Runs arbiter and agent operations against a [`StateStore`]. Every call
//! follows the same shape: authorize the caller, load the entities it
//! touches, apply the operation in memory, write back against the version
//! it was loaded at, then broadcast the resulting events.
//!
//! A call that fails at any step writes nothing. A concurrent writer that
//! got there first turns into `StoreConflict`; the caller reloads and
//! retries if it still wants to.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::core::geometry::Position;
use crate::game::agent::PlayerAgent;
use crate::game::arbiter::{ArbiterState, MatchArbiter};
use crate::game::config::MatchConfig;
use crate::game::error::{ArbiterError, Result};
use crate::game::events::{ArbiterEvent, ArbiterEventData};
use crate::game::identity::{MatchId, PlayerId, Seat};
use crate::service::auth::{authenticate, AuthConfig, Authorizer, Role};
use crate::service::store::{load, save, EntityKey, StateStore, Versioned};

/// Capacity of the event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One match served from a store.
pub struct MatchService<S: StateStore, A: Authorizer> {
    match_id: MatchId,
    config: MatchConfig,
    store: Arc<S>,
    authorizer: Arc<A>,
    auth: AuthConfig,
    event_tx: broadcast::Sender<ArbiterEvent>,
}

impl<S: StateStore, A: Authorizer> MatchService<S, A> {
    /// Serve `match_id` under `config`.
    pub fn new(match_id: MatchId, config: MatchConfig, store: Arc<S>, authorizer: Arc<A>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            match_id,
            config,
            store,
            authorizer,
            auth: AuthConfig::default(),
            event_tx,
        }
    }

    /// Accept bearer tokens verified under `auth`.
    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    /// Resolve a bearer token to the caller it identifies.
    ///
    /// Fails `Unauthenticated` when no verification key is configured.
    pub fn authenticate_caller(&self, token: &str) -> Result<PlayerId> {
        self.logged("authenticate", || {
            let caller = authenticate(token, &self.auth)?;
            info!(match_id = %self.match_id.short(), caller = %caller.short(), "caller authenticated");
            Ok(caller)
        })
    }

    /// Match served.
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    /// Rules in force.
    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Receive events from accepted transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<ArbiterEvent> {
        self.event_tx.subscribe()
    }

    /// Current arbiter view.
    pub fn arbiter(&self) -> Result<MatchArbiter> {
        let loaded = self.load_arbiter()?;
        Ok(MatchArbiter::from_state(loaded.value, self.config.clone()))
    }

    /// Current agent of `owner`.
    pub fn agent(&self, owner: PlayerId) -> Result<PlayerAgent> {
        Ok(load::<PlayerAgent, S>(&*self.store, &EntityKey::Agent(owner))?.value)
    }

    // =========================================================================
    // Match lifecycle (operator)
    // =========================================================================

    /// Store a blank arbiter for this match.
    pub fn create_match(&self, caller: &PlayerId) -> Result<()> {
        self.logged("create_match", || {
            self.authorize(caller, Role::Operator)?;
            let state = ArbiterState::new(self.match_id);
            save(&*self.store, &state, 0)?;
            info!(match_id = %self.match_id.short(), "match created");
            Ok(())
        })
    }

    /// Bind both participants' agents to the seats.
    pub fn instantiate_identities(&self, caller: &PlayerId, p1: PlayerId, p2: PlayerId) -> Result<()> {
        self.logged("instantiate_identities", || {
            self.authorize(caller, Role::Operator)?;
            let p1 = self.agent(p1)?;
            let p2 = self.agent(p2)?;
            self.with_arbiter(|arbiter| arbiter.instantiate_identities(&p1, &p2))
        })
    }

    /// Commit both starting positions.
    pub fn instantiate_positions(&self, caller: &PlayerId, p1: Position, p2: Position) -> Result<()> {
        self.logged("instantiate_positions", || {
            self.authorize(caller, Role::Operator)?;
            self.with_arbiter(|arbiter| arbiter.instantiate_positions(p1, p2))
        })
    }

    /// Commit one seat's starting position.
    pub fn instantiate_position(&self, caller: &PlayerId, seat: Seat, position: Position) -> Result<()> {
        self.logged("instantiate_position", || {
            self.authorize(caller, Role::Operator)?;
            self.with_arbiter(|arbiter| arbiter.instantiate_position(seat, position))
        })
    }

    /// Set both seats' health.
    pub fn instantiate_health(&self, caller: &PlayerId, value: u32) -> Result<()> {
        self.logged("instantiate_health", || {
            self.authorize(caller, Role::Operator)?;
            self.with_arbiter(|arbiter| arbiter.instantiate_health(value))
        })
    }

    /// Close the round.
    pub fn complete_round(&self, caller: &PlayerId) -> Result<()> {
        self.logged("complete_round", || {
            self.authorize(caller, Role::Operator)?;
            self.with_arbiter(MatchArbiter::complete_round)
        })
    }

    // =========================================================================
    // Agent operations (caller's own agent)
    // =========================================================================

    /// Create the caller's agent.
    pub fn register_agent(&self, caller: &PlayerId) -> Result<()> {
        self.logged("register_agent", || {
            save(&*self.store, &PlayerAgent::new(*caller), 0)?;
            Ok(())
        })
    }

    /// Bind the caller's agent to this match.
    pub fn join_match(&self, caller: &PlayerId) -> Result<()> {
        self.logged("join_match", || {
            let cursor = self.cursor()?;
            self.with_agent(caller, |agent| agent.join_match(self.match_id))?;
            self.publish(vec![ArbiterEvent::new(
                cursor.0,
                cursor.1,
                ArbiterEventData::AgentJoined { owner: *caller },
            )]);
            Ok(())
        })
    }

    /// Commit the caller's move and attack.
    pub fn commit_actions(&self, caller: &PlayerId, move_code: u8, attack_code: u8, salt: u64) -> Result<()> {
        self.logged("commit_actions", || {
            let cursor = self.cursor()?;
            let action_tick = self.with_agent(caller, |agent| {
                agent.set_pending_actions(move_code, attack_code, salt)?;
                Ok(agent.action_tick())
            })?;
            self.publish(vec![ArbiterEvent::new(
                cursor.0,
                cursor.1,
                ArbiterEventData::ActionsCommitted { owner: *caller, action_tick },
            )]);
            Ok(())
        })
    }

    /// Advance the caller's agent to the arbiter's game tick.
    pub fn sync_game_tick(&self, caller: &PlayerId) -> Result<()> {
        self.logged("sync_game_tick", || {
            let arbiter = self.arbiter()?;
            self.with_agent(caller, |agent| agent.sync_game_tick(&arbiter))
        })
    }

    // =========================================================================
    // Reveals (seat role + caller's agent)
    // =========================================================================

    /// Reveal the caller's move for `seat`.
    pub fn reveal_move(
        &self,
        caller: &PlayerId,
        seat: Seat,
        current: Position,
        move_code: u8,
        salt: u64,
    ) -> Result<()> {
        self.logged("reveal_move", || {
            self.authorize(caller, Role::for_seat(seat))?;
            let agent = self.agent(*caller)?;
            self.with_arbiter(|arbiter| arbiter.reveal_move(seat, &agent, current, move_code, salt))
        })
    }

    /// Reveal the caller's attack for `seat`.
    pub fn reveal_attack(
        &self,
        caller: &PlayerId,
        seat: Seat,
        own: Position,
        opponent: Position,
        attack_code: u8,
        salt: u64,
    ) -> Result<()> {
        self.logged("reveal_attack", || {
            self.authorize(caller, Role::for_seat(seat))?;
            let agent = self.agent(*caller)?;
            self.with_arbiter(|arbiter| {
                arbiter.reveal_attack(seat, &agent, own, opponent, attack_code, salt)
            })
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn authorize(&self, caller: &PlayerId, role: Role) -> Result<()> {
        if !self.authorizer.is_authorized(caller, role) {
            return Err(ArbiterError::Unauthorized { role });
        }
        Ok(())
    }

    fn load_arbiter(&self) -> Result<Versioned<ArbiterState>> {
        Ok(load(&*self.store, &EntityKey::Arbiter(self.match_id))?)
    }

    /// (game_tick, sub_tick) of the stored arbiter.
    fn cursor(&self) -> Result<(u64, u8)> {
        let state = self.load_arbiter()?.value;
        Ok((state.game_tick, state.sub_tick))
    }

    fn with_arbiter<T>(&self, op: impl FnOnce(&mut MatchArbiter) -> Result<T>) -> Result<T> {
        let loaded = self.load_arbiter()?;
        let mut arbiter = MatchArbiter::from_state(loaded.value, self.config.clone());
        let out = op(&mut arbiter)?;
        save(&*self.store, arbiter.state(), loaded.version)?;
        self.publish(arbiter.take_events());
        Ok(out)
    }

    fn with_agent<T>(&self, owner: &PlayerId, op: impl FnOnce(&mut PlayerAgent) -> Result<T>) -> Result<T> {
        let loaded = load::<PlayerAgent, S>(&*self.store, &EntityKey::Agent(*owner))?;
        let mut agent = loaded.value;
        let out = op(&mut agent)?;
        save(&*self.store, &agent, loaded.version)?;
        Ok(out)
    }

    fn publish(&self, events: Vec<ArbiterEvent>) {
        for event in events {
            // No subscribers is not an error.
            let _ = self.event_tx.send(event);
        }
    }

    fn logged<T>(&self, op: &'static str, run: impl FnOnce() -> Result<T>) -> Result<T> {
        let result = run();
        if let Err(ref err) = result {
            warn!(
                match_id = %self.match_id.short(),
                op,
                kind = ?err.kind(),
                error = %err,
                "operation rejected"
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::error::{ErrorKind, SequenceError, StateField};
    use crate::service::store::{FieldKey, FieldValue, InMemoryStore, Record, StateStore, StoreError};

    const OPERATOR: PlayerId = PlayerId::new([0xAA; 16]);
    const ALICE: PlayerId = PlayerId::new([1; 16]);
    const BOB: PlayerId = PlayerId::new([2; 16]);

    fn service() -> MatchService<InMemoryStore, crate::service::auth::RoleTable> {
        let roles = crate::service::auth::RoleTable::new()
            .with(OPERATOR, Role::Operator)
            .with(ALICE, Role::Player1)
            .with(BOB, Role::Player2);
        MatchService::new(
            MatchId::new([7; 16]),
            MatchConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(roles),
        )
    }

    fn ready_service() -> MatchService<InMemoryStore, crate::service::auth::RoleTable> {
        ready_service_on(Arc::new(InMemoryStore::new()))
    }

    fn ready_service_on<S: StateStore>(store: Arc<S>) -> MatchService<S, crate::service::auth::RoleTable> {
        let roles = crate::service::auth::RoleTable::new()
            .with(OPERATOR, Role::Operator)
            .with(ALICE, Role::Player1)
            .with(BOB, Role::Player2);
        let svc = MatchService::new(MatchId::new([7; 16]), MatchConfig::default(), store, Arc::new(roles));
        svc.create_match(&OPERATOR).unwrap();
        for p in [ALICE, BOB] {
            svc.register_agent(&p).unwrap();
            svc.join_match(&p).unwrap();
        }
        svc.instantiate_identities(&OPERATOR, ALICE, BOB).unwrap();
        svc.instantiate_positions(&OPERATOR, Position::new(1, 4), Position::new(7, 5)).unwrap();
        svc.instantiate_health(&OPERATOR, 10).unwrap();
        svc
    }

    #[test]
    fn test_full_round_through_store() {
        let svc = ready_service();
        svc.commit_actions(&ALICE, 6, 2, 42069).unwrap();
        svc.commit_actions(&BOB, 1, 4, 69420).unwrap();

        svc.reveal_move(&ALICE, Seat::P1, Position::new(1, 4), 6, 42069).unwrap();
        svc.reveal_move(&BOB, Seat::P2, Position::new(7, 5), 1, 69420).unwrap();
        svc.reveal_attack(&ALICE, Seat::P1, Position::new(2, 4), Position::new(6, 4), 2, 42069)
            .unwrap();
        svc.reveal_attack(&BOB, Seat::P2, Position::new(6, 4), Position::new(2, 4), 4, 69420)
            .unwrap();
        svc.complete_round(&OPERATOR).unwrap();

        let arbiter = svc.arbiter().unwrap();
        assert_eq!(arbiter.health(Seat::P1), 8);
        assert_eq!(arbiter.health(Seat::P2), 10);
        assert_eq!(arbiter.game_tick(), 1);
        assert_eq!(arbiter.sub_tick(), 0);

        svc.sync_game_tick(&ALICE).unwrap();
        assert_eq!(svc.agent(ALICE).unwrap().game_tick_mirror(), 1);
    }

    #[test]
    fn test_roles_enforced() {
        let svc = service();
        assert!(matches!(
            svc.create_match(&ALICE),
            Err(ArbiterError::Unauthorized { role: Role::Operator })
        ));

        let svc = ready_service();
        svc.commit_actions(&ALICE, 6, 2, 1).unwrap();
        // Alice does not hold the P2 role.
        assert!(matches!(
            svc.reveal_move(&ALICE, Seat::P2, Position::new(1, 4), 6, 1),
            Err(ArbiterError::Unauthorized { role: Role::Player2 })
        ));
        assert!(matches!(
            svc.complete_round(&BOB),
            Err(ArbiterError::Unauthorized { role: Role::Operator })
        ));
    }

    #[test]
    fn test_seat_role_without_seat_identity() {
        let svc = ready_service();
        let roles = crate::service::auth::RoleTable::new()
            .with(OPERATOR, Role::Operator)
            .with(BOB, Role::Player1);
        // Same store, but Bob is granted P1's role.
        let rogue = MatchService::new(svc.match_id(), MatchConfig::default(), Arc::clone(&svc.store), Arc::new(roles));

        svc.commit_actions(&BOB, 6, 2, 5).unwrap();
        let err = rogue.reveal_move(&BOB, Seat::P1, Position::new(1, 4), 6, 5).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::CommitmentMismatch { field: StateField::Identity(Seat::P1) }
        ));
    }

    #[test]
    fn test_rejected_call_writes_nothing() {
        let svc = ready_service();
        let key = EntityKey::Arbiter(svc.match_id());
        let before = svc.store.version(&key).unwrap();

        svc.commit_actions(&BOB, 1, 4, 3).unwrap();
        let err = svc.reveal_move(&BOB, Seat::P2, Position::new(7, 5), 1, 3).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::OutOfSequence(SequenceError::SubTick { expected: 1, found: 0 })
        ));
        assert_eq!(svc.store.version(&key).unwrap(), before);
    }

    #[test]
    fn test_duplicate_creation_conflicts() {
        let svc = service();
        svc.create_match(&OPERATOR).unwrap();
        let err = svc.create_match(&OPERATOR).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreConflict);

        svc.register_agent(&ALICE).unwrap();
        assert_eq!(svc.register_agent(&ALICE).unwrap_err().kind(), ErrorKind::StoreConflict);
    }

    #[test]
    fn test_stale_snapshot_conflicts() {
        let svc = ready_service();
        let key = EntityKey::Arbiter(svc.match_id());
        let stale = load::<ArbiterState, _>(&*svc.store, &key).unwrap();

        svc.commit_actions(&ALICE, 6, 2, 1).unwrap();
        svc.reveal_move(&ALICE, Seat::P1, Position::new(1, 4), 6, 1).unwrap();

        let err: ArbiterError = save(&*svc.store, &stale.value, stale.version).unwrap_err().into();
        assert!(matches!(err, ArbiterError::StoreConflict { .. }));
        assert_eq!(svc.arbiter().unwrap().sub_tick(), 1);
    }

    #[test]
    fn test_unknown_agent_is_storage_error() {
        let svc = service();
        svc.create_match(&OPERATOR).unwrap();
        let err = svc.join_match(&ALICE).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
    }

    fn bearer_token(sub: &str, secret: &str) -> String {
        use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let claims = crate::service::auth::TokenClaims {
            sub: sub.into(),
            exp: now + 3600,
            iat: now,
            iss: None,
            aud: None,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn test_token_callers_act_in_granted_roles() {
        const SECRET: &str = "duel-secret-key-256-bits-long!!!";
        let roles = Arc::new(crate::service::auth::RoleTable::new());
        let svc = MatchService::new(
            MatchId::new([7; 16]),
            MatchConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::clone(&roles),
        )
        .with_auth(AuthConfig { secret: Some(SECRET.into()), ..Default::default() });

        let operator = svc.authenticate_caller(&bearer_token("ops", SECRET)).unwrap();
        let alice = svc.authenticate_caller(&bearer_token("alice", SECRET)).unwrap();
        assert_eq!(alice, svc.authenticate_caller(&bearer_token("alice", SECRET)).unwrap());
        assert_ne!(alice, operator);

        roles.grant(operator, Role::Operator);
        roles.grant(alice, Role::Player1);
        svc.create_match(&operator).unwrap();
        svc.register_agent(&alice).unwrap();
        svc.join_match(&alice).unwrap();
        assert_eq!(svc.create_match(&alice).unwrap_err().kind(), ErrorKind::Unauthorized);

        let forged = bearer_token("ops", "some-other-secret-of-enough-len!");
        let err = svc.authenticate_caller(&forged).unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::Unauthenticated(crate::service::auth::AuthError::InvalidSignature)
        ));
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_tokens_rejected_without_auth_config() {
        let err = service()
            .authenticate_caller(&bearer_token("alice", "duel-secret-key-256-bits-long!!!"))
            .unwrap_err();
        assert!(matches!(
            err,
            ArbiterError::Unauthenticated(crate::service::auth::AuthError::NotConfigured)
        ));
    }

    /// Store that applies a queued write just before a chosen field read.
    struct InterleavingStore {
        inner: InMemoryStore,
        queued: parking_lot::Mutex<Option<(EntityKey, FieldKey, Vec<(FieldKey, FieldValue)>)>>,
    }

    impl InterleavingStore {
        fn new() -> Self {
            Self { inner: InMemoryStore::new(), queued: parking_lot::Mutex::new(None) }
        }

        fn write_before_read(&self, entity: EntityKey, field: FieldKey, fields: Vec<(FieldKey, FieldValue)>) {
            *self.queued.lock() = Some((entity, field, fields));
        }
    }

    impl StateStore for InterleavingStore {
        fn read(&self, entity: &EntityKey, field: FieldKey) -> std::result::Result<FieldValue, StoreError> {
            let due = {
                let mut queued = self.queued.lock();
                match &*queued {
                    Some((e, f, _)) if e == entity && *f == field => queued.take(),
                    _ => None,
                }
            };
            if let Some((e, _, fields)) = due {
                let version = self.inner.version(&e)?;
                self.inner.write_all(&e, version, fields)?;
            }
            self.inner.read(entity, field)
        }

        fn version(&self, entity: &EntityKey) -> std::result::Result<u64, StoreError> {
            self.inner.version(entity)
        }

        fn write_all(
            &self,
            entity: &EntityKey,
            expected_version: u64,
            fields: Vec<(FieldKey, FieldValue)>,
        ) -> std::result::Result<u64, StoreError> {
            self.inner.write_all(entity, expected_version, fields)
        }
    }

    #[test]
    fn test_commit_racing_a_reveal_cannot_mix_rounds() {
        let store = Arc::new(InterleavingStore::new());
        let svc = ready_service_on(Arc::clone(&store));

        // Round 0 plays out; Alice ends at (2, 4).
        svc.commit_actions(&ALICE, 6, 2, 42069).unwrap();
        svc.commit_actions(&BOB, 1, 4, 69420).unwrap();
        svc.reveal_move(&ALICE, Seat::P1, Position::new(1, 4), 6, 42069).unwrap();
        svc.reveal_move(&BOB, Seat::P2, Position::new(7, 5), 1, 69420).unwrap();
        svc.reveal_attack(&ALICE, Seat::P1, Position::new(2, 4), Position::new(6, 4), 2, 42069)
            .unwrap();
        svc.reveal_attack(&BOB, Seat::P2, Position::new(6, 4), Position::new(2, 4), 4, 69420)
            .unwrap();
        svc.complete_round(&OPERATOR).unwrap();
        svc.sync_game_tick(&ALICE).unwrap();

        // Alice's round-1 commit lands between the reads of her old pending
        // move and her action tick.
        let mut next = svc.agent(ALICE).unwrap();
        next.set_pending_actions(9, 8, 99).unwrap();
        store.write_before_read(EntityKey::Agent(ALICE), FieldKey::ActionTick, next.to_fields());

        // Replaying the round-0 choice must not pass on the mixed snapshot.
        let err = svc
            .reveal_move(&ALICE, Seat::P1, Position::new(2, 4), 6, 42069)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreConflict);
        assert_eq!(svc.arbiter().unwrap().sub_tick(), 0);

        // The stale choice also fails against a clean read, the real one passes.
        let err = svc
            .reveal_move(&ALICE, Seat::P1, Position::new(2, 4), 6, 42069)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CommitmentMismatch);
        svc.reveal_move(&ALICE, Seat::P1, Position::new(2, 4), 9, 99).unwrap();
        assert_eq!(svc.arbiter().unwrap().sub_tick(), 1);
    }

    #[tokio::test]
    async fn test_events_broadcast_in_order() {
        let svc = ready_service();
        let mut rx = svc.subscribe();

        svc.commit_actions(&ALICE, 6, 2, 42069).unwrap();
        svc.reveal_move(&ALICE, Seat::P1, Position::new(1, 4), 6, 42069).unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(
            first.data,
            ArbiterEventData::ActionsCommitted { owner: ALICE, action_tick: 1 }
        );
        let second = rx.recv().await.unwrap();
        assert!(matches!(second.data, ArbiterEventData::Moved { seat: Seat::P1, .. }));
        assert_eq!(second.sub_tick, 0);
    }

    #[tokio::test]
    async fn test_rejected_call_broadcasts_nothing() {
        let svc = ready_service();
        let mut rx = svc.subscribe();

        assert!(svc.complete_round(&OPERATOR).is_err());
        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }
}
