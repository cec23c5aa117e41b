//! Vector math and tile/world coordinate helpers.
//!
//! World positions are pixels in `f32`; one tile is [`TILE_SIZE`] pixels.
//! Range checks throughout the simulation compare squared distances so no
//! square root is taken on hot paths.

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// Edge length of one grid tile in world units.
pub const TILE_SIZE: f32 = 32.0;

/// Tolerance used for power and charge comparisons.
pub const EPSILON: f32 = 1e-6;

/// 2D vector in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X coordinate.
    pub x: f32,
    /// Y coordinate.
    pub y: f32,
}

impl Vec2 {
    /// Create a new vector.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Squared length.
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction, or zero for (near) zero input.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq <= 1e-9 {
            return Self::ZERO;
        }
        let len = len_sq.sqrt();
        Self::new(self.x / len, self.y / len)
    }

    /// Angle of this vector in radians, as `atan2(y, x)`.
    #[must_use]
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x)
    }

    /// Clamp each component into `[min, max]`.
    #[must_use]
    pub fn clamp(self, min: Self, max: Self) -> Self {
        Self::new(self.x.clamp(min.x, max.x), self.y.clamp(min.y, max.y))
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// Convert a world coordinate to the tile index containing it.
#[must_use]
pub fn world_to_tile(v: f32) -> i32 {
    (v / TILE_SIZE).floor() as i32
}

/// Number of whole tiles spanned by `radius`, plus `pad` extra rings.
///
/// Used to bound grid scans before the exact squared-distance test.
#[must_use]
pub fn tile_span(radius: f32, pad: i32) -> i32 {
    (radius / TILE_SIZE) as i32 + pad
}
