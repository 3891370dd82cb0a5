//! Attack Resolution
//!
//! Turns a revealed attack choice into the cells it covers and the damage it
//! deals. `CardinalLine` drives the standard round; the other shapes are
//! selectable through `MatchConfig::attack_shape`.

use std::str::FromStr;
use serde::{Serialize, Deserialize};

use crate::core::geometry::{AttackSurface, DirectionVector, Position};
use crate::game::error::InvalidInput;

/// Damage of a melee swing.
pub const MELEE_DAMAGE: u32 = 1;

/// Damage of a projected range attack.
pub const RANGE_DAMAGE: u32 = 2;

/// Damage of a straight shot.
pub const STRAIGHT_SHOT_DAMAGE: u32 = 3;

/// Attack strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackShape {
    /// Line of `range` cells next to the attacker, configured damage.
    #[default]
    CardinalLine,
    /// 3x3 square centred on the attacker, direction ignored.
    Melee,
    /// Box from the attacker to `range` steps out, attacker cell included.
    Range,
    /// Line of `range` cells next to the attacker, fixed heavy damage.
    StraightShot,
}

/// Where an attack lands and how hard.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedAttack {
    /// Covered cells
    pub surface: AttackSurface,
    /// Damage dealt on a hit
    pub damage: u32,
}

impl ResolvedAttack {
    /// Whether `target` takes the hit.
    #[inline]
    pub fn hits(&self, target: Position) -> bool {
        self.surface.contains(target)
    }
}

impl AttackShape {
    /// Resolve an attack from `origin` in direction `code`.
    ///
    /// `range` and `line_damage` come from the match configuration; only
    /// `CardinalLine` uses `line_damage`.
    pub fn resolve(
        self,
        origin: Position,
        code: u8,
        range: u32,
        line_damage: u32,
    ) -> Result<ResolvedAttack, InvalidInput> {
        let direction = DirectionVector::cardinal_from_code(code)?;
        if range == 0 {
            return Err(InvalidInput::InvalidRange { range });
        }

        let resolved = match self {
            AttackShape::CardinalLine => ResolvedAttack {
                surface: origin.attack_surface(code, range)?,
                damage: line_damage,
            },
            AttackShape::Melee => ResolvedAttack {
                surface: AttackSurface::spanning(
                    origin.offset(Position::new(-1, -1))?,
                    origin.offset(Position::new(1, 1))?,
                ),
                damage: MELEE_DAMAGE,
            },
            AttackShape::Range => ResolvedAttack {
                surface: AttackSurface::spanning(
                    origin,
                    origin.offset(direction.scale(i64::from(range))?)?,
                ),
                damage: RANGE_DAMAGE,
            },
            AttackShape::StraightShot => ResolvedAttack {
                surface: origin.attack_surface(code, range)?,
                damage: STRAIGHT_SHOT_DAMAGE,
            },
        };

        Ok(resolved)
    }
}

impl FromStr for AttackShape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cardinal_line" | "cardinal-line" | "line" => Ok(Self::CardinalLine),
            "melee" => Ok(Self::Melee),
            "range" => Ok(Self::Range),
            "straight_shot" | "straight-shot" => Ok(Self::StraightShot),
            other => Err(format!("unknown attack shape: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cardinal_line_matches_surface() {
        let origin = Position::new(6, 4);
        let attack = AttackShape::CardinalLine.resolve(origin, 4, 5, 2).unwrap();
        assert_eq!(attack.surface, origin.attack_surface(4, 5).unwrap());
        assert_eq!(attack.damage, 2);
        assert!(attack.hits(Position::new(2, 4)));
        assert!(!attack.hits(origin));
    }

    #[test]
    fn test_melee_square() {
        let attack = AttackShape::Melee.resolve(Position::new(0, 0), 8, 5, 2).unwrap();
        assert_eq!(attack.damage, MELEE_DAMAGE);
        assert_eq!(attack.surface.cell_count(), 9);
        assert!(attack.hits(Position::new(-1, 1)));
        assert!(attack.hits(Position::new(0, 0)));
        assert!(!attack.hits(Position::new(2, 0)));
    }

    #[test]
    fn test_range_includes_origin() {
        let attack = AttackShape::Range.resolve(Position::new(0, 0), 2, 5, 2).unwrap();
        assert_eq!(attack.damage, RANGE_DAMAGE);
        assert!(attack.hits(Position::new(0, 0)));
        assert!(attack.hits(Position::new(0, -5)));
        assert!(!attack.hits(Position::new(0, -6)));
        assert!(!attack.hits(Position::new(1, -2)));
    }

    #[test]
    fn test_straight_shot_heavy() {
        let attack = AttackShape::StraightShot.resolve(Position::new(0, 0), 6, 5, 2).unwrap();
        assert_eq!(attack.damage, STRAIGHT_SHOT_DAMAGE);
        assert!(attack.hits(Position::new(5, 0)));
        assert!(!attack.hits(Position::new(0, 0)));
    }

    #[test]
    fn test_non_cardinal_rejected_for_every_shape() {
        for shape in [
            AttackShape::CardinalLine,
            AttackShape::Melee,
            AttackShape::Range,
            AttackShape::StraightShot,
        ] {
            assert_eq!(
                shape.resolve(Position::ORIGIN, 9, 5, 2),
                Err(InvalidInput::InvalidAttackDirection { code: 9 })
            );
        }
    }

    #[test]
    fn test_shapes_at_grid_edge_fail_cleanly() {
        let corner = Position::new(i64::MAX, i64::MIN);
        assert!(matches!(
            AttackShape::Melee.resolve(corner, 8, 5, 2),
            Err(InvalidInput::OutOfGrid { .. })
        ));
        assert!(matches!(
            AttackShape::Range.resolve(corner, 6, 5, 2),
            Err(InvalidInput::OutOfGrid { .. })
        ));
        // Pointing back into the grid is fine.
        assert!(AttackShape::Range.resolve(corner, 4, 5, 2).is_ok());
    }

    #[test]
    fn test_parse_shape() {
        assert_eq!("melee".parse::<AttackShape>(), Ok(AttackShape::Melee));
        assert_eq!("Straight-Shot".parse::<AttackShape>(), Ok(AttackShape::StraightShot));
        assert!("laser".parse::<AttackShape>().is_err());
    }
}
