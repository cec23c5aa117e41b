use rand::Rng;

use super::stats::{self, MAX_TIER};
use crate::enemy::EnemyId;
use crate::grid::GridPos;
use crate::resources::ResourceKind;
use crate::world::World;

/// Turret state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turret {
    /// Loaded shots (tiers 1-2).
    pub ammo: u32,
    /// Aim angle in radians.
    pub angle: f32,
    /// Current target.
    pub target: Option<EnemyId>,
    /// Seconds since the last shot.
    pub fire_timer: f32,
}

impl Turret {
    /// Start the fire timer at a random phase so turrets placed together do not
    /// volley in lockstep.
    pub fn randomize_phase<R: Rng>(&mut self, tier: u8, rng: &mut R) {
        self.fire_timer = rng.gen_range(0.0..stats::turret(tier).fire_interval);
    }

    /// Copper loads ammo below tier 3.
    pub fn accept(&mut self, item: ResourceKind, tier: u8) -> bool {
        if tier < MAX_TIER && item == ResourceKind::Copper && self.ammo < stats::TURRET_AMMO_CAPACITY {
            self.ammo += 1;
            return true;
        }
        false
    }

    pub(super) fn update(&mut self, pos: GridPos, tier: u8, powered: bool, world: &mut World, dt: f32) {
        let stats = stats::turret(tier);
        let center = pos.center();
        let range_sq = stats.range * stats.range;
        self.fire_timer += dt;

        let tracked = self
            .target
            .and_then(|id| world.enemy(id))
            .filter(|e| !e.destroyed && e.pos.distance_squared(center) <= range_sq)
            .map(|e| (e.id, e.pos));
        let target = match tracked {
            Some(t) => Some(t),
            None => {
                let found = world.nearest_enemy_within(center, range_sq);
                self.target = found.map(|(id, _)| id);
                found
            }
        };
        let Some((target_id, target_pos)) = target else {
            return;
        };

        self.angle = (target_pos - center).angle();
        let armed = if tier < MAX_TIER { self.ammo > 0 } else { powered };
        if self.fire_timer >= stats.fire_interval && armed {
            self.fire_timer = 0.0;
            if tier < MAX_TIER {
                self.ammo -= 1;
            }
            world.spawn_projectile(center, target_id, target_pos, stats.damage);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::math::Vec2;

    #[test]
    fn test_fires_at_enemy_in_range() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        let enemy = world.spawn_enemy_at(pos.center() + Vec2::new(64.0, 0.0), 50.0);

        let mut turret = Turret {
            ammo: 2,
            ..Turret::default()
        };
        turret.update(pos, 1, false, &mut world, 0.5);

        assert_eq!(turret.target, Some(enemy));
        assert_eq!(turret.ammo, 1);
        assert_eq!(world.projectiles().count(), 1);
        assert!(turret.angle.abs() < 1e-6);
    }

    #[test]
    fn test_no_ammo_no_shot() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        world.spawn_enemy_at(pos.center() + Vec2::new(0.0, 40.0), 50.0);

        let mut turret = Turret::default();
        turret.update(pos, 1, false, &mut world, 1.0);
        assert_eq!(world.projectiles().count(), 0);
    }

    #[test]
    fn test_tier_three_needs_power_not_ammo() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        world.spawn_enemy_at(pos.center() + Vec2::new(0.0, 40.0), 50.0);

        let mut turret = Turret::default();
        turret.update(pos, 3, false, &mut world, 1.0);
        assert_eq!(world.projectiles().count(), 0);
        turret.update(pos, 3, true, &mut world, 1.0);
        assert_eq!(world.projectiles().count(), 1);
        assert!(!turret.accept(ResourceKind::Copper, 3));
    }

    #[test]
    fn test_ignores_out_of_range() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        world.spawn_enemy_at(pos.center() + Vec2::new(6.0 * 32.0, 0.0), 50.0);

        let mut turret = Turret {
            ammo: 5,
            ..Turret::default()
        };
        turret.update(pos, 1, false, &mut world, 1.0);
        assert_eq!(turret.target, None);
        assert_eq!(turret.ammo, 5);
    }

    #[test]
    fn test_ammo_capacity() {
        let mut turret = Turret {
            ammo: stats::TURRET_AMMO_CAPACITY,
            ..Turret::default()
        };
        assert!(!turret.accept(ResourceKind::Copper, 1));
        turret.ammo -= 1;
        assert!(!turret.accept(ResourceKind::Coal, 1));
        assert!(turret.accept(ResourceKind::Copper, 1));
    }
}
