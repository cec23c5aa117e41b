use super::stats;
use crate::grid::{GridPos, Orientation};
use crate::resources::ResourceKind;
use crate::world::World;

/// Conveyor state.
///
/// Holds up to the tier capacity of a single item kind. `progress` is the
/// front item's travel fraction and stays within `0.0..=1.0`; it saturates at
/// 1.0 while the tile ahead refuses the item.
#[derive(Debug, Clone, PartialEq)]
pub struct Conveyor {
    /// Output direction.
    pub orientation: Orientation,
    /// Carried item kind; `None` when empty.
    pub item: Option<ResourceKind>,
    /// Carried item count.
    pub count: u32,
    /// Travel fraction of the front item.
    pub progress: f32,
}

impl Conveyor {
    /// Empty conveyor facing `orientation`.
    #[must_use]
    pub const fn new(orientation: Orientation) -> Self {
        Self {
            orientation,
            item: None,
            count: 0,
            progress: 0.0,
        }
    }

    /// Take `item` if empty, or if holding the same kind with room left.
    pub fn accept(&mut self, item: ResourceKind, tier: u8) -> bool {
        if self.count >= stats::conveyor(tier).capacity {
            return false;
        }
        if self.count == 0 {
            self.item = Some(item);
            self.count = 1;
            self.progress = 0.0;
            return true;
        }
        if self.item == Some(item) {
            self.count += 1;
            return true;
        }
        false
    }

    pub(super) fn clamp_to_capacity(&mut self, tier: u8) {
        self.count = self.count.min(stats::conveyor(tier).capacity);
        if self.count == 0 {
            self.item = None;
            self.progress = 0.0;
        }
    }

    pub(super) fn update(&mut self, pos: GridPos, tier: u8, world: &mut World, dt: f32) {
        let Some(item) = self.item.filter(|_| self.count > 0) else {
            return;
        };
        self.progress += dt / stats::conveyor(tier).transfer_time;
        if self.progress < 1.0 {
            return;
        }

        if world.deliver_item(pos.step(self.orientation), item) {
            self.count -= 1;
            if self.count > 0 {
                self.progress = (self.progress - 1.0).clamp(0.0, 1.0);
            } else {
                self.progress = 0.0;
                self.item = None;
            }
        } else {
            self.progress = 1.0;
        }
    }

    pub(super) fn advance_cosmetic(&mut self, tier: u8, dt: f32) {
        if self.count > 0 {
            self.progress = (self.progress + dt / stats::conveyor(tier).transfer_time).min(1.0);
        }
    }
}
