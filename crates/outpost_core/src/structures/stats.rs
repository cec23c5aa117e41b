//! Per-kind and per-tier stat tables.
//!
//! Tier-dependent values are looked up from the structure's current tier on
//! every use, so an upgrade only has to bump the tier and rescale hp.

/// Highest tier any structure can reach.
pub const MAX_TIER: u8 = 3;

/// Share of the build cost returned when a player removes a structure.
pub const REFUND_RATIO: f32 = 0.5;

/// Core hit points.
pub const CORE_HP: f32 = 1500.0;
/// Wall hit points.
pub const WALL_HP: f32 = 400.0;
/// Coal generator hit points.
pub const GENERATOR_HP: f32 = 200.0;
/// Power pole hit points.
pub const POWER_POLE_HP: f32 = 80.0;
/// Battery hit points.
pub const BATTERY_HP: f32 = 250.0;
/// Reconstructor hit points.
pub const RECONSTRUCTOR_HP: f32 = 300.0;

/// Drill stats for one tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrillTier {
    /// Seconds per mined unit.
    pub mining_interval: f32,
    /// Hit points.
    pub max_hp: f32,
}

/// Drill tiers 1..=3.
pub const DRILL_TIERS: [DrillTier; 3] = [
    DrillTier { mining_interval: 1.8, max_hp: 100.0 },
    DrillTier { mining_interval: 1.4, max_hp: 140.0 },
    DrillTier { mining_interval: 1.0, max_hp: 180.0 },
];

/// Minimum seconds between drill output attempts.
pub const DRILL_OUTPUT_COOLDOWN: f32 = 0.1;

/// Conveyor stats for one tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConveyorTier {
    /// Seconds to move one item across the tile.
    pub transfer_time: f32,
    /// Hit points.
    pub max_hp: f32,
    /// Items held at once.
    pub capacity: u32,
}

/// Conveyor tiers 1..=3.
pub const CONVEYOR_TIERS: [ConveyorTier; 3] = [
    ConveyorTier { transfer_time: 0.8, max_hp: 50.0, capacity: 1 },
    ConveyorTier { transfer_time: 0.55, max_hp: 70.0, capacity: 2 },
    ConveyorTier { transfer_time: 0.35, max_hp: 90.0, capacity: 3 },
];

/// Turret stats for one tier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurretTier {
    /// Targeting range in world units.
    pub range: f32,
    /// Damage per projectile.
    pub damage: f32,
    /// Seconds between shots.
    pub fire_interval: f32,
    /// Hit points.
    pub max_hp: f32,
}

/// Turret tiers 1..=3.
pub const TURRET_TIERS: [TurretTier; 3] = [
    TurretTier { range: 5.0 * 32.0, damage: 30.0, fire_interval: 0.45, max_hp: 150.0 },
    TurretTier { range: 5.5 * 32.0, damage: 40.0, fire_interval: 0.40, max_hp: 220.0 },
    TurretTier { range: 6.0 * 32.0, damage: 55.0, fire_interval: 0.30, max_hp: 300.0 },
];

/// Turret ammo capacity (tiers 1-2).
pub const TURRET_AMMO_CAPACITY: u32 = 12;
/// Power drawn by a tier 3 turret.
pub const TURRET_POWER_DRAW: f32 = 15.0;

/// Coal held by a generator.
pub const GENERATOR_BUFFER_CAP: u32 = 10;
/// Seconds per coal burned.
pub const GENERATOR_BURN_INTERVAL: f32 = 3.0;
/// Power output while burning.
pub const GENERATOR_OUTPUT: f32 = 30.0;

/// Battery storage capacity.
pub const BATTERY_CAPACITY: f32 = 3000.0;
/// Maximum charge rate per second.
pub const BATTERY_CHARGE_RATE: f32 = 40.0;
/// Maximum discharge rate per second.
pub const BATTERY_DISCHARGE_RATE: f32 = 40.0;

/// Power drawn by a reconstructor.
pub const RECONSTRUCTOR_POWER_DRAW: f32 = 10.0;
/// Hit points restored per second of accumulated repair time.
pub const RECONSTRUCTOR_REPAIR_RATE: f32 = 8.0;
/// Repair reach in world units.
pub const RECONSTRUCTOR_RADIUS: f32 = 2.5 * 32.0;
/// Seconds between repair checks.
pub const RECONSTRUCTOR_CHECK_INTERVAL: f32 = 0.1;

/// Table index for `tier`, clamped into `1..=MAX_TIER`.
#[must_use]
pub fn tier_index(tier: u8) -> usize {
    usize::from(tier.clamp(1, MAX_TIER) - 1)
}

/// Drill stats at `tier`.
#[must_use]
pub fn drill(tier: u8) -> DrillTier {
    DRILL_TIERS[tier_index(tier)]
}

/// Conveyor stats at `tier`.
#[must_use]
pub fn conveyor(tier: u8) -> ConveyorTier {
    CONVEYOR_TIERS[tier_index(tier)]
}

/// Turret stats at `tier`.
#[must_use]
pub fn turret(tier: u8) -> TurretTier {
    TURRET_TIERS[tier_index(tier)]
}
