//! Grid Geometry
//!
//! Integer positions on an unbounded grid, numpad direction vectors and
//! axis-aligned attack surfaces. Everything here is pure and `Copy`.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::game::error::InvalidInput;

// =============================================================================
// DIRECTION LOOKUP TABLE
// =============================================================================

/// Direction vectors indexed by numpad code minus one.
///
/// ```text
/// 7 8 9      (-1,+1) (0,+1) (+1,+1)
/// 4 5 6  ->  (-1, 0) (0, 0) (+1, 0)
/// 1 2 3      (-1,-1) (0,-1) (+1,-1)
/// ```
pub static DIRECTION_LUT: [DirectionVector; 9] = [
    DirectionVector::new(-1, -1),
    DirectionVector::new(0, -1),
    DirectionVector::new(1, -1),
    DirectionVector::new(-1, 0),
    DirectionVector::new(0, 0),
    DirectionVector::new(1, 0),
    DirectionVector::new(-1, 1),
    DirectionVector::new(0, 1),
    DirectionVector::new(1, 1),
];

/// Codes accepted for attacks (down, left, right, up).
pub const CARDINAL_CODES: [u8; 4] = [2, 4, 6, 8];

/// Check whether a numpad code names one of the four cardinal directions.
#[inline]
pub fn is_cardinal_code(code: u8) -> bool {
    CARDINAL_CODES.contains(&code)
}

// =============================================================================
// DIRECTION VECTOR
// =============================================================================

/// Unit or zero step on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectionVector {
    /// X step (-1, 0 or +1)
    pub dx: i64,
    /// Y step (-1, 0 or +1)
    pub dy: i64,
}

impl DirectionVector {
    /// No movement (numpad 5).
    pub const STAY: Self = Self::new(0, 0);

    const fn new(dx: i64, dy: i64) -> Self {
        Self { dx, dy }
    }

    /// Map a numpad code (1-9) to its vector.
    pub fn from_code(code: u8) -> Result<Self, InvalidInput> {
        match code {
            1..=9 => Ok(DIRECTION_LUT[(code - 1) as usize]),
            _ => Err(InvalidInput::InvalidDirection { code }),
        }
    }

    /// Map a cardinal code (2, 4, 6, 8) to its vector.
    pub fn cardinal_from_code(code: u8) -> Result<Self, InvalidInput> {
        if !is_cardinal_code(code) {
            return Err(InvalidInput::InvalidAttackDirection { code });
        }
        Self::from_code(code)
    }

    /// True for the four axis-aligned unit vectors.
    #[inline]
    pub fn is_cardinal(self) -> bool {
        (self.dx == 0) != (self.dy == 0)
    }

    /// Scale both components.
    #[inline]
    pub fn scale(self, factor: i64) -> Result<Position, InvalidInput> {
        match (self.dx.checked_mul(factor), self.dy.checked_mul(factor)) {
            (Some(x), Some(y)) => Ok(Position::new(x, y)),
            _ => Err(InvalidInput::OutOfGrid { x: self.dx, y: self.dy }),
        }
    }
}

// =============================================================================
// POSITION
// =============================================================================

/// Cell on the grid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    /// Column
    pub x: i64,
    /// Row (grows upward)
    pub y: i64,
}

impl Position {
    /// Grid origin.
    pub const ORIGIN: Self = Self { x: 0, y: 0 };

    /// Create a position.
    #[inline]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Translate by one step.
    #[inline]
    pub fn step(self, direction: DirectionVector) -> Result<Self, InvalidInput> {
        self.offset(Position::new(direction.dx, direction.dy))
    }

    /// Translate by an arbitrary offset.
    ///
    /// Fails rather than wrapping when a coordinate leaves the `i64` range.
    #[inline]
    pub fn offset(self, other: Position) -> Result<Self, InvalidInput> {
        match (self.x.checked_add(other.x), self.y.checked_add(other.y)) {
            (Some(x), Some(y)) => Ok(Self { x, y }),
            _ => Err(InvalidInput::OutOfGrid { x: self.x, y: self.y }),
        }
    }

    /// Components in hashing order.
    #[inline]
    pub fn to_values(self) -> [i64; 2] {
        [self.x, self.y]
    }

    /// Line of `range` cells starting next to `self` in a cardinal direction.
    ///
    /// The origin cell is never part of the surface.
    pub fn attack_surface(self, code: u8, range: u32) -> Result<AttackSurface, InvalidInput> {
        let direction = DirectionVector::cardinal_from_code(code)?;
        if range == 0 {
            return Err(InvalidInput::InvalidRange { range });
        }

        let near = self.step(direction)?;
        let far = self.offset(direction.scale(i64::from(range))?)?;
        Ok(AttackSurface::spanning(near, far))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({}, {})", self.x, self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

// =============================================================================
// ATTACK SURFACE
// =============================================================================

/// Inclusive axis-aligned region an attack covers.
///
/// `start` is the low corner and `end` the high corner on both axes. A line
/// surface has one axis constant, so the box test also pins the point to that
/// axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackSurface {
    /// Low corner
    pub start: Position,
    /// High corner
    pub end: Position,
}

impl AttackSurface {
    /// Surface covering the box between two corners, in any order.
    pub fn spanning(a: Position, b: Position) -> Self {
        Self {
            start: Position::new(a.x.min(b.x), a.y.min(b.y)),
            end: Position::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Whether `point` is covered.
    #[inline]
    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.start.x
            && point.x <= self.end.x
            && point.y >= self.start.y
            && point.y <= self.end.y
    }

    /// True when x is constant across the surface.
    #[inline]
    pub fn is_vertical(&self) -> bool {
        self.start.x == self.end.x
    }

    /// True when y is constant across the surface.
    #[inline]
    pub fn is_horizontal(&self) -> bool {
        self.start.y == self.end.y
    }

    /// Number of covered cells.
    pub fn cell_count(&self) -> u64 {
        let w = self.end.x.abs_diff(self.start.x).saturating_add(1);
        let h = self.end.y.abs_diff(self.start.y).saturating_add(1);
        w.saturating_mul(h)
    }
}

// =============================================================================
// TESTS
// =============================================================================
