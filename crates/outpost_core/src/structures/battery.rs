use super::stats;

/// Battery state. Charge flows are decided by the power engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Battery {
    /// Stored charge, `0.0..=BATTERY_CAPACITY`.
    pub charge: f32,
    /// Charged during the last power step.
    pub is_charging: bool,
    /// Discharged during the last power step.
    pub is_discharging: bool,
}

impl Battery {
    /// Most this battery can supply over `elapsed` seconds.
    #[must_use]
    pub fn max_discharge(&self, elapsed: f32) -> f32 {
        self.charge.min(stats::BATTERY_DISCHARGE_RATE * elapsed).max(0.0)
    }

    /// Most this battery can absorb over `elapsed` seconds.
    #[must_use]
    pub fn max_charge(&self, elapsed: f32) -> f32 {
        (stats::BATTERY_CAPACITY - self.charge)
            .min(stats::BATTERY_CHARGE_RATE * elapsed)
            .max(0.0)
    }

    pub(super) fn update(&mut self) {
        self.charge = self.charge.clamp(0.0, stats::BATTERY_CAPACITY);
    }
}
