//! Durable State Store
//!
//! Field-level reads and all-or-nothing multi-field writes per entity.
//! Concurrency is optimistic: every entity carries a version, a write names
//! the version it was computed against, and a stale version is a conflict
//! with nothing written.

use std::collections::BTreeMap;
use std::fmt;
use parking_lot::Mutex;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::events::MatchOutcome;
use crate::game::identity::{MatchId, PlayerId, Seat};
use crate::proof::commitment::Commitment;

// =============================================================================
// KEYS AND VALUES
// =============================================================================

/// Stored entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    /// Shared match state
    Arbiter(MatchId),
    /// A player's agent, keyed by its owner
    Agent(PlayerId),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Arbiter(id) => write!(f, "arbiter:{}", id.short()),
            Self::Agent(id) => write!(f, "agent:{}", id.short()),
        }
    }
}

/// Field of an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldKey {
    /// Agent owner
    Owner,
    /// Agent's bound match
    MatchBinding,
    /// Agent's committed move
    PendingMove,
    /// Agent's committed attack
    PendingAttack,
    /// Agent's action tick
    ActionTick,
    /// Agent's last observed game tick
    GameTickMirror,
    /// Arbiter's own id
    MatchId,
    /// Seat identity commitment
    Identity(Seat),
    /// Seat position commitment
    Position(Seat),
    /// Seat health
    Health(Seat),
    /// Completed rounds
    GameTick,
    /// Phase cursor
    SubTick,
    /// Match result
    Outcome,
}

/// Stored value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// A participant identity
    Player(PlayerId),
    /// A match id, possibly unset
    Match(Option<MatchId>),
    /// A commitment, possibly unset
    Commitment(Option<Commitment>),
    /// A tick counter
    Counter(u64),
    /// A health value
    Health(u32),
    /// The phase cursor
    SubTick(u8),
    /// A match result, possibly unset
    Outcome(Option<MatchOutcome>),
}

/// Store failures.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The entity changed since it was read.
    #[error("conflict on {entity}: expected version {expected}, found {found}")]
    Conflict {
        /// Entity written
        entity: EntityKey,
        /// Version the write was based on
        expected: u64,
        /// Current version
        found: u64,
    },
    /// No such entity.
    #[error("{entity} does not exist")]
    MissingEntity {
        /// Entity requested
        entity: EntityKey,
    },
    /// Entity exists but lacks the field.
    #[error("{entity} has no field {field:?}")]
    MissingField {
        /// Entity requested
        entity: EntityKey,
        /// Field requested
        field: FieldKey,
    },
    /// Field holds a value of the wrong type.
    #[error("field {field:?} holds an unexpected value type")]
    TypeMismatch {
        /// Field read
        field: FieldKey,
    },
}

macro_rules! typed_getter {
    ($name:ident, $variant:ident, $ty:ty) => {
        /// Unwrap the expected variant or report a type mismatch.
        pub fn $name(self, field: FieldKey) -> Result<$ty, StoreError> {
            match self {
                FieldValue::$variant(v) => Ok(v),
                _ => Err(StoreError::TypeMismatch { field }),
            }
        }
    };
}

impl FieldValue {
    typed_getter!(into_player, Player, PlayerId);
    typed_getter!(into_match, Match, Option<MatchId>);
    typed_getter!(into_commitment, Commitment, Option<Commitment>);
    typed_getter!(into_counter, Counter, u64);
    typed_getter!(into_health, Health, u32);
    typed_getter!(into_sub_tick, SubTick, u8);
    typed_getter!(into_outcome, Outcome, Option<MatchOutcome>);
}

// =============================================================================
// STORE INTERFACE
// =============================================================================

/// Durable field store.
pub trait StateStore: Send + Sync {
    /// Read one field.
    fn read(&self, entity: &EntityKey, field: FieldKey) -> Result<FieldValue, StoreError>;

    /// Current version of an entity; 0 if it does not exist yet.
    fn version(&self, entity: &EntityKey) -> Result<u64, StoreError>;

    /// Atomically write every field, provided the entity is still at
    /// `expected_version`. Returns the new version.
    fn write_all(
        &self,
        entity: &EntityKey,
        expected_version: u64,
        fields: Vec<(FieldKey, FieldValue)>,
    ) -> Result<u64, StoreError>;
}

/// Entity that round-trips through a [`StateStore`].
pub trait Record: Sized {
    /// Key this record is stored under.
    fn key(&self) -> EntityKey;

    /// Every field, in a stable order.
    fn to_fields(&self) -> Vec<(FieldKey, FieldValue)>;

    /// Rebuild from field reads.
    fn from_fields<F>(read: F) -> Result<Self, StoreError>
    where
        F: FnMut(FieldKey) -> Result<FieldValue, StoreError>;
}

/// Snapshot of a record together with the version it was read at.
#[derive(Clone, Debug)]
pub struct Versioned<T> {
    /// The record
    pub value: T,
    /// Version at read time
    pub version: u64,
}

/// Read a full record and its version.
///
/// Fields are read one at a time, so the version is checked on both sides of
/// the reads. A write landing in between makes the snapshot a mix of two
/// versions and is reported as a conflict.
pub fn load<R, S>(store: &S, key: &EntityKey) -> Result<Versioned<R>, StoreError>
where
    R: Record,
    S: StateStore + ?Sized,
{
    let version = store.version(key)?;
    if version == 0 {
        return Err(StoreError::MissingEntity { entity: *key });
    }
    let value = R::from_fields(|field| store.read(key, field))?;

    let found = store.version(key)?;
    if found != version {
        return Err(StoreError::Conflict { entity: *key, expected: version, found });
    }
    Ok(Versioned { value, version })
}

/// Write a full record against the version it was loaded at.
pub fn save<R, S>(store: &S, record: &R, expected_version: u64) -> Result<u64, StoreError>
where
    R: Record,
    S: StateStore + ?Sized,
{
    store.write_all(&record.key(), expected_version, record.to_fields())
}

// =============================================================================
// IN-MEMORY STORE
// =============================================================================

#[derive(Debug, Default)]
struct StoredEntity {
    version: u64,
    fields: BTreeMap<FieldKey, FieldValue>,
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entities: Mutex<BTreeMap<EntityKey, StoredEntity>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entities.
    pub fn len(&self) -> usize {
        self.entities.lock().len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entities.lock().is_empty()
    }
}

impl StateStore for InMemoryStore {
    fn read(&self, entity: &EntityKey, field: FieldKey) -> Result<FieldValue, StoreError> {
        let entities = self.entities.lock();
        let stored = entities
            .get(entity)
            .ok_or(StoreError::MissingEntity { entity: *entity })?;
        stored
            .fields
            .get(&field)
            .cloned()
            .ok_or(StoreError::MissingField { entity: *entity, field })
    }

    fn version(&self, entity: &EntityKey) -> Result<u64, StoreError> {
        Ok(self.entities.lock().get(entity).map_or(0, |e| e.version))
    }

    fn write_all(
        &self,
        entity: &EntityKey,
        expected_version: u64,
        fields: Vec<(FieldKey, FieldValue)>,
    ) -> Result<u64, StoreError> {
        let mut entities = self.entities.lock();

        let found = entities.get(entity).map_or(0, |e| e.version);
        if found != expected_version {
            return Err(StoreError::Conflict {
                entity: *entity,
                expected: expected_version,
                found,
            });
        }

        let stored = entities.entry(*entity).or_default();
        stored.fields.extend(fields);
        stored.version += 1;
        Ok(stored.version)
    }
}
