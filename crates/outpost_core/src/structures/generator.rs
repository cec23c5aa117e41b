use super::stats;
use crate::resources::ResourceKind;

/// Coal generator state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoalGenerator {
    /// Coal buffered.
    pub buffer: u32,
    /// Burning this tick; only then is the generator a power source.
    pub is_generating: bool,
    /// Seconds burned on the current coal unit.
    pub burn_timer: f32,
}

impl CoalGenerator {
    /// Take coal while the buffer has room.
    pub fn accept(&mut self, item: ResourceKind) -> bool {
        if item == ResourceKind::Coal && self.buffer < stats::GENERATOR_BUFFER_CAP {
            self.buffer += 1;
            return true;
        }
        false
    }

    pub(super) fn update(&mut self, dt: f32) {
        self.is_generating = self.buffer > 0;
        if !self.is_generating {
            self.burn_timer = 0.0;
            return;
        }
        self.burn_timer += dt;
        if self.burn_timer >= stats::GENERATOR_BURN_INTERVAL {
            self.burn_timer -= stats::GENERATOR_BURN_INTERVAL;
            self.buffer -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burns_one_coal_per_interval() {
        let mut gen = CoalGenerator::default();
        assert!(gen.accept(ResourceKind::Coal));
        assert!(!gen.accept(ResourceKind::Copper));

        gen.update(1.0);
        assert!(gen.is_generating);
        gen.update(2.0);
        assert_eq!(gen.buffer, 0);
        // Still flagged until the next update observes the empty buffer.
        assert!(gen.is_generating);
        gen.update(0.1);
        assert!(!gen.is_generating);
    }

    #[test]
    fn test_buffer_cap() {
        let mut gen = CoalGenerator {
            buffer: stats::GENERATOR_BUFFER_CAP,
            ..CoalGenerator::default()
        };
        assert!(!gen.accept(ResourceKind::Coal));
    }
}
