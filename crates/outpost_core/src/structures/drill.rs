use rand::seq::SliceRandom;

use super::stats;
use crate::grid::{GridPos, Orientation};
use crate::resources::ResourceKind;
use crate::world::World;

/// Drill state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Drill {
    /// Patch kind bound at placement.
    pub resource: Option<ResourceKind>,
    /// Mined units waiting for output.
    pub held: u32,
    /// Seconds accumulated towards the next mined unit.
    pub mining_timer: f32,
    /// Seconds since the last output attempt.
    pub output_timer: f32,
}

impl Drill {
    pub(super) fn update(&mut self, pos: GridPos, tier: u8, world: &mut World, dt: f32) {
        let Some(resource) = self.resource else {
            return;
        };
        if world.terrain_at(pos) != Some(resource) {
            return;
        }

        let interval = stats::drill(tier).mining_interval;
        self.mining_timer += dt;
        if self.mining_timer >= interval {
            self.mining_timer -= interval;
            self.held += 1;
        }

        self.output_timer += dt;
        if self.held > 0 && self.output_timer >= stats::DRILL_OUTPUT_COOLDOWN {
            self.output_timer = 0.0;
            let mut dirs = Orientation::ALL;
            dirs.shuffle(world.rng());
            for dir in dirs {
                if world.deliver_item(pos.step(dir), resource) {
                    self.held -= 1;
                    break;
                }
            }
        }
    }
}
