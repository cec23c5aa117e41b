use rand::seq::SliceRandom;

use super::stats;
use crate::grid::GridPos;
use crate::world::World;

/// Reconstructor state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reconstructor {
    /// Powered seconds since the last repair check.
    pub repair_timer: f32,
}

impl Reconstructor {
    pub(super) fn update(&mut self, pos: GridPos, powered: bool, world: &mut World, dt: f32) {
        if !powered {
            self.repair_timer = 0.0;
            return;
        }
        self.repair_timer += dt;
        if self.repair_timer < stats::RECONSTRUCTOR_CHECK_INTERVAL {
            return;
        }

        let heal = stats::RECONSTRUCTOR_REPAIR_RATE * self.repair_timer;
        self.repair_timer = 0.0;

        let candidates = world.damaged_structures_within(pos.center(), stats::RECONSTRUCTOR_RADIUS);
        let Some(id) = candidates.choose(world.rng()).cloned() else {
            return;
        };
        if let Some(target) = world.structure_mut(&id) {
            target.hp = (target.hp + heal).min(target.max_hp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::grid::Orientation;
    use crate::structures::{Structure, StructureKind};

    #[test]
    fn test_heals_damaged_neighbour_when_powered() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        let mut wall = Structure::new(StructureKind::Wall, pos.offset(1, 0), Orientation::East);
        wall.hp = 100.0;
        let wall_id = wall.id.clone();
        assert!(world.insert_structure(wall));

        let mut recon = Reconstructor::default();
        recon.update(pos, false, &mut world, 1.0);
        assert_eq!(recon.repair_timer, 0.0);
        assert_eq!(world.get_by_id(&wall_id).map(|s| s.hp), Some(100.0));

        recon.update(pos, true, &mut world, 0.5);
        let hp = world.get_by_id(&wall_id).map(|s| s.hp).unwrap_or_default();
        assert!((hp - 104.0).abs() < 1e-4);
    }

    #[test]
    fn test_never_overheals() {
        let mut world = World::new(WorldConfig::default());
        let pos = GridPos::new(10, 10);
        let mut wall = Structure::new(StructureKind::Wall, pos.offset(0, 1), Orientation::East);
        wall.hp = wall.max_hp - 1.0;
        let wall_id = wall.id.clone();
        assert!(world.insert_structure(wall));

        let mut recon = Reconstructor::default();
        recon.update(pos, true, &mut world, 10.0);
        let s = world.get_by_id(&wall_id).unwrap();
        assert_eq!(s.hp, s.max_hp);
    }
}
