//! Players: avatars that move around and act as the build-range anchor.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::{Vec2, TILE_SIZE};

/// Movement speed in world units per second.
pub const PLAYER_SPEED: f32 = 5.0 * TILE_SIZE;
/// Collision radius in world units.
pub const PLAYER_RADIUS: f32 = 0.4 * TILE_SIZE;
/// Build reach in world units.
pub const BUILD_RADIUS: f32 = 8.0 * TILE_SIZE;

/// Small integer player id. The host is always [`PlayerId::HOST`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u32);

impl PlayerId {
    /// The host player.
    pub const HOST: PlayerId = PlayerId(0);
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name and colour chosen by a player before joining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Display name.
    pub name: String,
    /// Palette index.
    pub color_index: u32,
}

impl Default for PlayerProfile {
    fn default() -> Self {
        Self {
            name: "Player".to_string(),
            color_index: 0,
        }
    }
}

/// A player avatar.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    /// Id.
    pub id: PlayerId,
    /// World position.
    pub pos: Vec2,
    /// Latest movement intent; normalized when applied.
    pub move_intent: Vec2,
    /// World units per second.
    pub speed: f32,
    /// Display name.
    pub name: String,
    /// Palette index.
    pub color_index: u32,
}

impl Player {
    /// New idle player.
    #[must_use]
    pub fn new(id: PlayerId, pos: Vec2, profile: &PlayerProfile) -> Self {
        Self {
            id,
            pos,
            move_intent: Vec2::ZERO,
            speed: PLAYER_SPEED,
            name: profile.name.clone(),
            color_index: profile.color_index,
        }
    }

    /// Move along the current intent, clamped to the map.
    pub fn update(&mut self, dt: f32, map_size: Vec2) {
        let dir = self.move_intent.normalize_or_zero();
        if dir == Vec2::ZERO {
            return;
        }
        let min = Vec2::new(PLAYER_RADIUS, PLAYER_RADIUS);
        let max = Vec2::new(map_size.x - PLAYER_RADIUS, map_size.y - PLAYER_RADIUS);
        self.pos = (self.pos + dir * (self.speed * dt)).clamp(min, max);
    }

    /// Whether `point` is within build reach.
    #[must_use]
    pub fn can_reach(&self, point: Vec2) -> bool {
        self.pos.distance_squared(point) <= BUILD_RADIUS * BUILD_RADIUS
    }

    /// Wire representation.
    #[must_use]
    pub fn state(&self) -> PlayerState {
        PlayerState {
            id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            name: self.name.clone(),
            color_idx: self.color_index,
        }
    }

    /// Build from wire representation.
    #[must_use]
    pub fn from_state(state: &PlayerState) -> Self {
        let profile = PlayerProfile {
            name: state.name.clone(),
            color_index: state.color_idx,
        };
        Self::new(state.id, Vec2::new(state.x, state.y), &profile)
    }

    /// Overwrite synced fields. The movement intent is local and kept.
    pub fn apply_state(&mut self, state: &PlayerState) {
        self.pos = Vec2::new(state.x, state.y);
        self.name.clone_from(&state.name);
        self.color_index = state.color_idx;
    }
}

/// Synced player state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Id.
    pub id: PlayerId,
    /// X.
    pub x: f32,
    /// Y.
    pub y: f32,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Palette index.
    #[serde(default)]
    pub color_idx: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moves_at_speed_along_normalized_intent() {
        let mut player = Player::new(PlayerId(1), Vec2::new(100.0, 100.0), &PlayerProfile::default());
        player.move_intent = Vec2::new(3.0, 0.0);
        player.update(0.1, Vec2::new(1000.0, 1000.0));
        assert!((player.pos.x - (100.0 + PLAYER_SPEED * 0.1)).abs() < 1e-3);
    }

    #[test]
    fn test_clamped_to_map() {
        let mut player = Player::new(PlayerId(1), Vec2::new(20.0, 20.0), &PlayerProfile::default());
        player.move_intent = Vec2::new(-1.0, -1.0);
        player.update(10.0, Vec2::new(640.0, 640.0));
        assert_eq!(player.pos, Vec2::new(PLAYER_RADIUS, PLAYER_RADIUS));
    }

    #[test]
    fn test_build_reach() {
        let player = Player::new(PlayerId(0), Vec2::ZERO, &PlayerProfile::default());
        assert!(player.can_reach(Vec2::new(BUILD_RADIUS, 0.0)));
        assert!(!player.can_reach(Vec2::new(BUILD_RADIUS + 1.0, 0.0)));
    }
}
