//! Projectiles fired by turrets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::enemy::EnemyId;
use crate::math::{Vec2, TILE_SIZE};
use crate::world::World;

/// Flight speed in world units per second.
pub const PROJECTILE_SPEED: f32 = 7.5 * TILE_SIZE;
/// Seconds before a projectile expires.
pub const PROJECTILE_LIFETIME: f32 = 2.0;
/// Hit radius in world units.
pub const PROJECTILE_HIT_RADIUS: f32 = TILE_SIZE / 3.0 + 4.0;

/// Monotonically assigned projectile id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectileId(pub u32);

impl fmt::Display for ProjectileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p_{}", self.0)
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    /// Id.
    pub id: ProjectileId,
    /// World position.
    pub pos: Vec2,
    /// World units per second.
    pub velocity: Vec2,
    /// Damage on hit.
    pub damage: f32,
    /// Seconds left.
    pub lifetime: f32,
    /// Enemy this projectile can hit.
    pub target: Option<EnemyId>,
    /// Marked on hit, expiry or leaving the map; removed at cleanup.
    pub destroyed: bool,
}

impl Projectile {
    /// Projectile from `origin` aimed at `target_pos`.
    #[must_use]
    pub fn aimed(id: ProjectileId, origin: Vec2, target: EnemyId, target_pos: Vec2, damage: f32) -> Self {
        Self {
            id,
            pos: origin,
            velocity: (target_pos - origin).normalize_or_zero() * PROJECTILE_SPEED,
            damage,
            lifetime: PROJECTILE_LIFETIME,
            target: Some(target),
            destroyed: false,
        }
    }

    pub(crate) fn update(&mut self, world: &mut World, dt: f32) {
        if self.destroyed {
            return;
        }
        self.pos += self.velocity * dt;
        self.lifetime -= dt;

        if let Some(target) = self.target {
            let hit = world.enemy(target).is_some_and(|e| {
                !e.destroyed
                    && e.pos.distance_squared(self.pos) < PROJECTILE_HIT_RADIUS * PROJECTILE_HIT_RADIUS
            });
            if hit {
                world.damage_enemy(target, self.damage);
                self.destroyed = true;
                return;
            }
        }

        let size = world.grid().world_size();
        let inside = self.pos.x >= 0.0 && self.pos.x < size.x && self.pos.y >= 0.0 && self.pos.y < size.y;
        if self.lifetime <= 0.0 || !inside {
            self.destroyed = true;
        }
    }

    /// Cosmetic flight on replicas.
    pub(crate) fn interpolate(&mut self, dt: f32) {
        if !self.destroyed {
            self.pos += self.velocity * dt;
        }
    }

    /// Wire representation.
    #[must_use]
    pub fn state(&self) -> ProjectileState {
        ProjectileState {
            net_id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            vx: self.velocity.x,
            vy: self.velocity.y,
            damage: self.damage,
            lifetime: self.lifetime,
            target: self.target,
        }
    }

    /// Build from wire representation.
    #[must_use]
    pub fn from_state(state: &ProjectileState) -> Self {
        let mut p = Self {
            id: state.net_id,
            pos: Vec2::ZERO,
            velocity: Vec2::ZERO,
            damage: 0.0,
            lifetime: PROJECTILE_LIFETIME,
            target: None,
            destroyed: false,
        };
        p.apply_state(state);
        p
    }

    /// Overwrite synced fields.
    pub fn apply_state(&mut self, state: &ProjectileState) {
        self.pos = Vec2::new(state.x, state.y);
        self.velocity = Vec2::new(state.vx, state.vy);
        self.damage = state.damage;
        self.lifetime = state.lifetime;
        self.target = state.target;
    }
}

fn default_lifetime() -> f32 {
    PROJECTILE_LIFETIME
}

/// Synced projectile state.
///
/// `damage`, `lifetime` and `target` are optional on input so bare
/// position/velocity payloads decode; saves carry them so a reloaded
/// projectile still hits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    /// Id.
    pub net_id: ProjectileId,
    /// X.
    pub x: f32,
    /// Y.
    pub y: f32,
    /// Velocity x.
    pub vx: f32,
    /// Velocity y.
    pub vy: f32,
    /// Damage on hit.
    #[serde(default)]
    pub damage: f32,
    /// Seconds left.
    #[serde(default = "default_lifetime")]
    pub lifetime: f32,
    /// Target enemy.
    #[serde(default)]
    pub target: Option<EnemyId>,
}
