//! Match Configuration

use std::str::FromStr;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::game::attack::AttackShape;
use crate::game::turn::RoundSchedule;

/// Default starting health for both players.
pub const DEFAULT_STARTING_HEALTH: u32 = 10;

/// Default damage of a landed cardinal line attack.
pub const DEFAULT_ATTACK_DAMAGE: u32 = 2;

/// Default attack reach in cells.
pub const DEFAULT_ATTACK_RANGE: u32 = 5;

/// How an attack treats a target whose health is below the damage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthGuard {
    /// Reject the whole reveal, hit or miss.
    #[default]
    RejectBelowDamage,
    /// Accept the reveal and floor health at zero on a hit.
    SaturateOnHit,
}

impl FromStr for HealthGuard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reject" | "reject_below_damage" => Ok(Self::RejectBelowDamage),
            "saturate" | "saturate_on_hit" => Ok(Self::SaturateOnHit),
            other => Err(format!("unknown health guard: {}", other)),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable present but unparsable.
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv {
        /// Variable name
        var: &'static str,
        /// Parse failure
        reason: String,
    },
    /// JSON document malformed.
    #[error("invalid config document: {0}")]
    Json(#[from] serde_json::Error),
    /// A value that must be positive is zero.
    #[error("{0} must be positive")]
    Zero(&'static str),
}

/// Rules of a match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Health both players start with
    pub starting_health: u32,
    /// Damage of a landed cardinal line attack
    pub attack_damage: u32,
    /// Attack reach in cells
    pub attack_range: u32,
    /// Attack strategy used by attack reveals
    pub attack_shape: AttackShape,
    /// Phase order of a round
    pub schedule: RoundSchedule,
    /// Low-health handling for attack reveals
    pub health_guard: HealthGuard,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            starting_health: DEFAULT_STARTING_HEALTH,
            attack_damage: DEFAULT_ATTACK_DAMAGE,
            attack_range: DEFAULT_ATTACK_RANGE,
            attack_shape: AttackShape::CardinalLine,
            schedule: RoundSchedule::standard(),
            health_guard: HealthGuard::RejectBelowDamage,
        }
    }
}

impl MatchConfig {
    /// Create config from environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            starting_health: env_or("DUEL_STARTING_HEALTH", defaults.starting_health)?,
            attack_damage: env_or("DUEL_ATTACK_DAMAGE", defaults.attack_damage)?,
            attack_range: env_or("DUEL_ATTACK_RANGE", defaults.attack_range)?,
            attack_shape: env_or("DUEL_ATTACK_SHAPE", defaults.attack_shape)?,
            schedule: defaults.schedule,
            health_guard: env_or("DUEL_HEALTH_GUARD", defaults.health_guard)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON document. Missing keys take their defaults.
    pub fn from_json(document: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a match unplayable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_health == 0 {
            return Err(ConfigError::Zero("starting_health"));
        }
        if self.attack_damage == 0 {
            return Err(ConfigError::Zero("attack_damage"));
        }
        if self.attack_range == 0 {
            return Err(ConfigError::Zero("attack_range"));
        }
        Ok(())
    }
}

fn env_or<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchConfig::default();
        assert_eq!(config.starting_health, 10);
        assert_eq!(config.attack_damage, 2);
        assert_eq!(config.attack_range, 5);
        assert_eq!(config.attack_shape, AttackShape::CardinalLine);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = MatchConfig::from_json(r#"{ "starting_health": 7, "attack_shape": "Melee" }"#)
            .unwrap();
        assert_eq!(config.starting_health, 7);
        assert_eq!(config.attack_shape, AttackShape::Melee);
        assert_eq!(config.attack_range, DEFAULT_ATTACK_RANGE);
    }

    #[test]
    fn test_from_json_rejects_zero() {
        let err = MatchConfig::from_json(r#"{ "attack_range": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Zero("attack_range")));
    }

    #[test]
    fn test_from_json_rejects_bad_schedule() {
        let err = MatchConfig::from_json(r#"{ "schedule": ["Complete"] }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_parse_health_guard() {
        assert_eq!("saturate".parse::<HealthGuard>(), Ok(HealthGuard::SaturateOnHit));
        assert!("maybe".parse::<HealthGuard>().is_err());
    }
}
