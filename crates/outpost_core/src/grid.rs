//! Tile grid occupancy.
//!
//! The grid stores at most one structure id per cell. It knows nothing about
//! structure contents; the world keeps the registry and the grid in step.
//! Resource-patch terrain is tracked separately by the world and is not an
//! occupant.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GameError;
use crate::math::{Vec2, TILE_SIZE};
use crate::structures::StructureId;

/// Integer tile coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridPos {
    /// Column.
    pub gx: i32,
    /// Row.
    pub gy: i32,
}

impl GridPos {
    /// Create a position.
    #[must_use]
    pub const fn new(gx: i32, gy: i32) -> Self {
        Self { gx, gy }
    }

    /// Offset by `(dx, dy)` tiles.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.gx + dx, self.gy + dy)
    }

    /// Adjacent tile in `dir`.
    #[must_use]
    pub fn step(self, dir: Orientation) -> Self {
        let (dx, dy) = dir.delta();
        self.offset(dx, dy)
    }

    /// World-space center of this tile.
    #[must_use]
    pub fn center(self) -> Vec2 {
        Vec2::new(
            self.gx as f32 * TILE_SIZE + TILE_SIZE / 2.0,
            self.gy as f32 * TILE_SIZE + TILE_SIZE / 2.0,
        )
    }

    /// Tile containing a world-space point.
    #[must_use]
    pub fn from_world(p: Vec2) -> Self {
        Self::new(
            crate::math::world_to_tile(p.x),
            crate::math::world_to_tile(p.y),
        )
    }
}

/// Terrain keys on the wire are `"gx,gy"`.
impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.gx, self.gy)
    }
}

impl FromStr for GridPos {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || GameError::InvalidTerrainKey(s.to_string());
        let (x, y) = s.split_once(',').ok_or_else(invalid)?;
        let gx = x.trim().parse().map_err(|_| invalid())?;
        let gy = y.trim().parse().map_err(|_| invalid())?;
        Ok(Self::new(gx, gy))
    }
}

/// Facing of directional structures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Towards negative y.
    North,
    /// Towards positive x.
    #[default]
    East,
    /// Towards positive y.
    South,
    /// Towards negative x.
    West,
}

impl Orientation {
    /// All four directions, clockwise from north.
    pub const ALL: [Orientation; 4] = [
        Orientation::North,
        Orientation::East,
        Orientation::South,
        Orientation::West,
    ];

    /// Tile delta for one step in this direction.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::North => (0, -1),
            Self::East => (1, 0),
            Self::South => (0, 1),
            Self::West => (-1, 0),
        }
    }
}

/// Occupancy grid of structure ids, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<Option<StructureId>>,
}

impl Grid {
    /// Create an empty grid.
    ///
    /// # Panics
    ///
    /// Panics if `width` or `height` is zero.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        assert!(width > 0, "Grid width must be positive");
        assert!(height > 0, "Grid height must be positive");

        let cell_count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            cells: vec![None; cell_count],
        }
    }

    /// Grid width in cells.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Grid height in cells.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Map extent in world units.
    #[must_use]
    pub fn world_size(&self) -> Vec2 {
        Vec2::new(
            self.width as f32 * TILE_SIZE,
            self.height as f32 * TILE_SIZE,
        )
    }

    #[inline]
    fn index(&self, pos: GridPos) -> Option<usize> {
        if self.in_bounds(pos) {
            Some((pos.gy as usize) * (self.width as usize) + (pos.gx as usize))
        } else {
            None
        }
    }

    /// Check if a position is within grid bounds.
    #[must_use]
    pub fn in_bounds(&self, pos: GridPos) -> bool {
        pos.gx >= 0 && pos.gy >= 0 && (pos.gx as u32) < self.width && (pos.gy as u32) < self.height
    }

    /// Occupant id at `pos`; `None` when empty or out of bounds.
    #[must_use]
    pub fn get(&self, pos: GridPos) -> Option<&StructureId> {
        self.index(pos).and_then(|i| self.cells[i].as_ref())
    }

    /// Set the occupant at `pos`. Returns `false` if out of bounds.
    pub fn set(&mut self, pos: GridPos, id: StructureId) -> bool {
        match self.index(pos) {
            Some(i) => {
                self.cells[i] = Some(id);
                true
            }
            None => false,
        }
    }

    /// Clear `pos` if it currently holds `id`. Returns whether it was cleared.
    pub fn clear_if(&mut self, pos: GridPos, id: &StructureId) -> bool {
        match self.index(pos) {
            Some(i) if self.cells[i].as_ref() == Some(id) => {
                self.cells[i] = None;
                true
            }
            _ => false,
        }
    }

    /// Positions in the square of radius `span` around `center`, clipped to the grid.
    pub fn square_around(&self, center: GridPos, span: i32) -> impl Iterator<Item = GridPos> + '_ {
        (-span..=span)
            .flat_map(move |dy| (-span..=span).map(move |dx| center.offset(dx, dy)))
            .filter(move |p| self.in_bounds(*p))
    }
}
