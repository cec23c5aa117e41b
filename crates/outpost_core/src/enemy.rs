//! Enemies: walk toward the core and attack whatever blocks them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::grid::GridPos;
use crate::math::{Vec2, TILE_SIZE};
use crate::structures::StructureId;
use crate::world::World;

/// Hit points of a wave 1 enemy.
pub const ENEMY_BASE_HP: f32 = 50.0;
/// Extra hit points per wave after the first.
pub const ENEMY_HP_PER_WAVE: f32 = 20.0;
/// Movement speed in world units per second.
pub const ENEMY_SPEED: f32 = 1.7 * TILE_SIZE;
/// Damage per melee hit.
pub const ENEMY_DAMAGE: f32 = 20.0;
/// Seconds between melee hits.
pub const ENEMY_ATTACK_COOLDOWN: f32 = 0.9;
/// Melee reach in world units.
pub const ENEMY_MELEE_RANGE: f32 = 0.8 * TILE_SIZE;
/// Copper credited for each kill.
pub const ENEMY_KILL_REWARD: u32 = 10;

/// Lookahead multiplier for the collision probe.
const LOOKAHEAD: f32 = 1.5;

/// Enemy hit points for `wave` (1-based).
#[must_use]
pub fn enemy_hp_for_wave(wave: u32) -> f32 {
    ENEMY_BASE_HP + ENEMY_HP_PER_WAVE * wave.saturating_sub(1) as f32
}

/// Monotonically assigned enemy id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnemyId(pub u32);

impl fmt::Display for EnemyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e_{}", self.0)
    }
}

/// A hostile unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Enemy {
    /// Id.
    pub id: EnemyId,
    /// World position.
    pub pos: Vec2,
    /// Current hp.
    pub hp: f32,
    /// Max hp.
    pub max_hp: f32,
    /// World units per second.
    pub speed: f32,
    /// Damage per hit.
    pub damage: f32,
    /// Seconds between hits.
    pub attack_cooldown: f32,
    /// Seconds accumulated towards the next hit.
    pub attack_timer: f32,
    /// Structure being attacked.
    pub target: Option<StructureId>,
    /// Where the enemy walks to.
    pub destination: Vec2,
    /// Marked when killed; removed at cleanup.
    pub destroyed: bool,
}

impl Enemy {
    /// New enemy with default stats.
    #[must_use]
    pub fn new(id: EnemyId, pos: Vec2, destination: Vec2, hp: f32) -> Self {
        Self {
            id,
            pos,
            hp,
            max_hp: hp,
            speed: ENEMY_SPEED,
            damage: ENEMY_DAMAGE,
            attack_cooldown: ENEMY_ATTACK_COOLDOWN,
            attack_timer: 0.0,
            target: None,
            destination,
            destroyed: false,
        }
    }

    /// Apply damage. Returns true if this call killed the enemy.
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if self.destroyed {
            return false;
        }
        self.hp -= amount;
        if self.hp <= 0.0 {
            self.hp = 0.0;
            self.destroyed = true;
            return true;
        }
        false
    }

    /// Pick the highest priority live structure within melee range around the
    /// enemy's tile. Ties keep the first found.
    fn find_attack_target(&self, world: &World) -> Option<StructureId> {
        let reach_sq = ENEMY_MELEE_RANGE * ENEMY_MELEE_RANGE;
        let mut best: Option<(u8, &StructureId)> = None;
        for cell in world.grid().square_around(GridPos::from_world(self.pos), 1) {
            let Some(s) = world.get_at(cell) else {
                continue;
            };
            if s.destroyed || s.center().distance_squared(self.pos) >= reach_sq {
                continue;
            }
            let priority = s.kind().attack_priority();
            if best.map_or(true, |(p, _)| priority > p) {
                best = Some((priority, &s.id));
            }
        }
        best.map(|(_, id)| id.clone())
    }

    pub(crate) fn update(&mut self, world: &mut World, dt: f32) {
        if self.destroyed {
            return;
        }

        let target_alive = self
            .target
            .as_ref()
            .and_then(|id| world.get_by_id(id))
            .is_some_and(|s| !s.destroyed);
        if !target_alive {
            self.target = self.find_attack_target(world);
            self.attack_timer = 0.0;
        }

        if let Some(id) = self.target.clone() {
            let in_reach = world.get_by_id(&id).is_some_and(|s| {
                s.center().distance_squared(self.pos) <= ENEMY_MELEE_RANGE * ENEMY_MELEE_RANGE
            });
            if in_reach {
                self.attack_timer += dt;
                if self.attack_timer >= self.attack_cooldown {
                    self.attack_timer = 0.0;
                    if world.damage_structure(&id, self.damage) {
                        self.target = None;
                    }
                }
                return;
            }
            self.target = None;
        }

        self.advance(world, dt);
    }

    fn advance(&mut self, world: &World, dt: f32) {
        let dir = (self.destination - self.pos).normalize_or_zero();
        if dir == Vec2::ZERO {
            return;
        }
        let step = dir * (self.speed * dt);

        let here = GridPos::from_world(self.pos);
        let ahead = GridPos::from_world(self.pos + step * LOOKAHEAD);
        if ahead != here {
            if let Some(blocker) = world.get_at(ahead).filter(|s| !s.destroyed) {
                if self.target.is_none() {
                    self.target = Some(blocker.id.clone());
                    self.attack_timer = self.attack_cooldown;
                }
                return;
            }
        }

        self.pos = (self.pos + step).clamp(Vec2::ZERO, world.grid().world_size());
    }

    /// Wire representation.
    #[must_use]
    pub fn state(&self) -> EnemyState {
        EnemyState {
            net_id: self.id,
            x: self.pos.x,
            y: self.pos.y,
            hp: self.hp,
            max_hp: self.max_hp,
        }
    }

    /// Overwrite synced fields.
    pub fn apply_state(&mut self, state: &EnemyState) {
        self.pos = Vec2::new(state.x, state.y);
        self.hp = state.hp;
        self.max_hp = state.max_hp;
    }
}

/// Synced enemy state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyState {
    /// Id.
    pub net_id: EnemyId,
    /// X.
    pub x: f32,
    /// Y.
    pub y: f32,
    /// Current hp.
    pub hp: f32,
    /// Max hp.
    pub max_hp: f32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::grid::Orientation;
    use crate::structures::{Structure, StructureKind};

    #[test]
    fn test_hp_scales_with_wave() {
        assert_eq!(enemy_hp_for_wave(1), 50.0);
        assert_eq!(enemy_hp_for_wave(3), 90.0);
        assert_eq!(enemy_hp_for_wave(0), 50.0);
    }

    #[test]
    fn test_walks_toward_destination() {
        let mut world = World::new(WorldConfig::default());
        let mut enemy = Enemy::new(EnemyId(1), Vec2::new(100.0, 100.0), Vec2::new(300.0, 100.0), 50.0);
        enemy.update(&mut world, 1.0);
        assert!((enemy.pos.x - (100.0 + ENEMY_SPEED)).abs() < 1e-3);
        assert_eq!(enemy.pos.y, 100.0);
    }

    #[test]
    fn test_blocked_enemy_attacks_blocker() {
        let mut world = World::new(WorldConfig::default());
        let wall_pos = GridPos::new(5, 3);
        let wall = Structure::new(StructureKind::Wall, wall_pos, Orientation::East);
        let wall_id = wall.id.clone();
        assert!(world.insert_structure(wall));

        // 28px from the wall center: outside melee reach, but the probe lands on it.
        let start = GridPos::new(4, 3).center() + Vec2::new(4.0, 0.0);
        let mut enemy = Enemy::new(EnemyId(1), start, GridPos::new(20, 3).center(), 50.0);

        enemy.update(&mut world, 0.2);
        assert_eq!(enemy.pos, start);
        assert_eq!(enemy.target, Some(wall_id));
    }

    #[test]
    fn test_attacks_on_cooldown() {
        let mut world = World::new(WorldConfig::default());
        let wall = Structure::new(StructureKind::Wall, GridPos::new(5, 3), Orientation::East);
        let wall_id = wall.id.clone();
        assert!(world.insert_structure(wall));

        let start = GridPos::new(4, 3).center() + Vec2::new(8.0, 0.0);
        let mut enemy = Enemy::new(EnemyId(1), start, GridPos::new(20, 3).center(), 50.0);

        enemy.update(&mut world, 0.5);
        assert_eq!(enemy.target, Some(wall_id.clone()));
        assert_eq!(world.get_by_id(&wall_id).map(|s| s.hp), Some(400.0));

        enemy.update(&mut world, 0.5);
        assert_eq!(world.get_by_id(&wall_id).map(|s| s.hp), Some(400.0 - ENEMY_DAMAGE));
        assert_eq!(enemy.pos, start);
    }

    #[test]
    fn test_prefers_higher_priority_target() {
        let mut world = World::new(WorldConfig::default());
        let conveyor = Structure::new(StructureKind::Conveyor, GridPos::new(5, 5), Orientation::East);
        let turret = Structure::new(StructureKind::Turret, GridPos::new(6, 5), Orientation::East);
        let turret_id = turret.id.clone();
        assert!(world.insert_structure(conveyor));
        assert!(world.insert_structure(turret));

        // Midpoint between both tile centers: 16px from each.
        let pos = Vec2::new(6.0 * 32.0, 5.0 * 32.0 + 16.0);
        let enemy = Enemy::new(EnemyId(1), pos, pos, 50.0);
        assert_eq!(enemy.find_attack_target(&world), Some(turret_id));
    }

    #[test]
    fn test_take_damage_kills_once() {
        let mut enemy = Enemy::new(EnemyId(1), Vec2::ZERO, Vec2::ZERO, 50.0);
        assert!(!enemy.take_damage(30.0));
        assert_eq!(enemy.hp, 20.0);
        assert!(enemy.take_damage(30.0));
        assert!(!enemy.take_damage(30.0));
    }
}
