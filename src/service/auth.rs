//! Caller Authorization
//!
//! Two layers: JWT validation turns a bearer token from an external auth
//! provider into a `PlayerId`, and an [`Authorizer`] decides whether that
//! caller may act in a given role for a match. The service never issues
//! tokens.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::game::identity::{PlayerId, Seat};

// =============================================================================
// ROLES
// =============================================================================

/// What a caller is allowed to do in a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Reveals for seat P1
    Player1,
    /// Reveals for seat P2
    Player2,
    /// Match setup and round completion
    Operator,
}

impl Role {
    /// Role that reveals for `seat`.
    pub fn for_seat(seat: Seat) -> Self {
        match seat {
            Seat::P1 => Role::Player1,
            Seat::P2 => Role::Player2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Player1 => write!(f, "player-1"),
            Role::Player2 => write!(f, "player-2"),
            Role::Operator => write!(f, "operator"),
        }
    }
}

/// Decides whether a caller holds a role.
pub trait Authorizer: Send + Sync {
    /// Whether `caller` may act as `role`.
    fn is_authorized(&self, caller: &PlayerId, role: Role) -> bool;
}

/// Static grant table.
#[derive(Debug, Default)]
pub struct RoleTable {
    grants: RwLock<BTreeMap<Role, BTreeSet<PlayerId>>>,
}

impl RoleTable {
    /// Empty table; nobody is authorized.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `role` to `caller`.
    pub fn grant(&self, caller: PlayerId, role: Role) {
        self.grants.write().entry(role).or_default().insert(caller);
    }

    /// Withdraw `role` from `caller`.
    pub fn revoke(&self, caller: &PlayerId, role: Role) {
        if let Some(holders) = self.grants.write().get_mut(&role) {
            holders.remove(caller);
        }
    }

    /// Builder form of [`grant`](Self::grant).
    pub fn with(self, caller: PlayerId, role: Role) -> Self {
        self.grant(caller, role);
        self
    }
}

impl Authorizer for RoleTable {
    fn is_authorized(&self, caller: &PlayerId, role: Role) -> bool {
        self.grants
            .read()
            .get(&role)
            .is_some_and(|holders| holders.contains(caller))
    }
}

// =============================================================================
// JWT
// =============================================================================

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// RS256 public key in PEM format.
    pub public_key_pem: Option<String>,
    /// HS256 secret.
    pub secret: Option<String>,
    /// Skip expiry validation (tests only).
    pub skip_expiry: bool,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            issuer: std::env::var("DUEL_AUTH_ISSUER").ok(),
            audience: std::env::var("DUEL_AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("DUEL_AUTH_PUBLIC_KEY_PEM").ok(),
            secret: std::env::var("DUEL_AUTH_SECRET").ok(),
            skip_expiry: std::env::var("DUEL_AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        }
    }

    /// Whether a verification key is present.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

/// Claims expected from the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the provider's user id.
    pub sub: String,
    /// Expiry (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
}

impl TokenClaims {
    /// Deterministic participant id for the subject.
    pub fn player_id(&self) -> PlayerId {
        let mut hasher = Sha256::new();
        hasher.update(b"duel-arbiter-player:");
        hasher.update(self.sub.as_bytes());
        let hash = hasher.finalize();

        let mut id = [0u8; 16];
        id.copy_from_slice(&hash[..16]);
        PlayerId::new(id)
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No verification key configured.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer mismatch.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience mismatch.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// Other decoding failure.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate a token and extract its claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    let algorithm = if config.public_key_pem.is_some() {
        Algorithm::RS256
    } else if config.secret.is_some() {
        Algorithm::HS256
    } else {
        return Err(AuthError::NotConfigured);
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }
    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }
    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let token_data: TokenData<TokenClaims> = match (&config.public_key_pem, &config.secret) {
        (Some(pem), _) => {
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?;
            decode(token, &key, &validation).map_err(map_jwt_error)?
        }
        (None, Some(secret)) => {
            let key = DecodingKey::from_secret(secret.as_bytes());
            decode(token, &key, &validation).map_err(map_jwt_error)?
        }
        (None, None) => return Err(AuthError::NotConfigured),
    };

    let claims = token_data.claims;
    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // jsonwebtoken only checks exp when the claim is required
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs());
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Validate a token and return the caller it identifies.
pub fn authenticate(token: &str, config: &AuthConfig) -> Result<PlayerId, AuthError> {
    validate_token(token, config).map(|claims| claims.player_id())
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}
