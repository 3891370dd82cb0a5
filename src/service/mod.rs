//! Service Layer
//!
//! Everything between callers and the game rules: who may do what, where
//! state lives between calls, and how accepted transitions are announced.
//! The rules themselves stay in `game/`.

pub mod auth;
pub mod client;
pub mod session;
pub mod store;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, Authorizer, Role, RoleTable, TokenClaims};
pub use client::{PlannedTurn, PlayerClient};
pub use session::MatchService;
pub use store::{EntityKey, FieldKey, FieldValue, InMemoryStore, Record, StateStore, StoreError, Versioned};
