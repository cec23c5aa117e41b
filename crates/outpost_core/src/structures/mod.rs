//! Structures: the buildings placed on the tile grid.
//!
//! A [`Structure`] carries the fields every building shares (position, hp,
//! tier, power bookkeeping) plus a closed [`Variant`] enum with the
//! kind-specific state. Behaviour is dispatched by matching on the variant:
//!
//! - `update` runs the per-tick behaviour of the variant.
//! - [`Structure::state`] / [`Structure::apply_state`] convert to and from the
//!   wire representation ([`StructureState`]).
//! - [`Structure::accept_item`] is the item hand-off used by drills and
//!   conveyors.
//!
//! Cross-entity references (turret targets, power sources, neighbour links)
//! are ids or coordinates resolved through the world on every use.

mod battery;
mod conveyor;
mod drill;
mod generator;
mod reconstructor;
mod state;
pub mod stats;
mod turret;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::grid::{GridPos, Orientation};
use crate::math::Vec2;
use crate::resources::{Cost, ResourceKind, ResourceMap};
use crate::world::World;

pub use battery::Battery;
pub use conveyor::Conveyor;
pub use drill::Drill;
pub use generator::CoalGenerator;
pub use reconstructor::Reconstructor;
pub use state::{StructureDetail, StructureState};
pub use turret::Turret;

use stats::MAX_TIER;

/// Network id of a structure: `"{gx}_{gy}_{code}"`.
///
/// Unique while the tile is occupied by that placement. A remove followed by a
/// re-place of the same kind on the same tile reuses the id; holders of stale
/// ids always re-resolve through the registry, so this is harmless.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructureId(String);

impl StructureId {
    /// Id minted for a placement of `kind` at `pos`.
    #[must_use]
    pub fn for_placement(kind: StructureKind, pos: GridPos) -> Self {
        Self(format!("{}_{}_{}", pos.gx, pos.gy, kind.code()))
    }

    /// Raw id string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StructureId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for StructureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    /// The shared base. Losing it ends the game.
    Core,
    /// Mines the resource patch it sits on.
    Drill,
    /// Moves items one tile in its facing direction.
    Conveyor,
    /// Shoots enemies.
    Turret,
    /// Passive hp sink.
    Wall,
    /// Burns coal into power.
    CoalGenerator,
    /// Relays power.
    PowerPole,
    /// Stores power.
    Battery,
    /// Repairs nearby structures while powered.
    Reconstructor,
}

impl StructureKind {
    /// Every kind a player may place.
    pub const BUILDABLE: [StructureKind; 8] = [
        StructureKind::Drill,
        StructureKind::Conveyor,
        StructureKind::Turret,
        StructureKind::Wall,
        StructureKind::CoalGenerator,
        StructureKind::PowerPole,
        StructureKind::Battery,
        StructureKind::Reconstructor,
    ];

    /// Numeric code used in network ids.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Drill => 1,
            Self::Conveyor => 2,
            Self::Turret => 3,
            Self::Wall => 4,
            Self::CoalGenerator => 5,
            Self::PowerPole => 6,
            Self::Core => 7,
            Self::Battery => 9,
            Self::Reconstructor => 10,
        }
    }

    /// Whether players may place this kind.
    #[must_use]
    pub const fn is_buildable(self) -> bool {
        !matches!(self, Self::Core)
    }

    /// Cost to place at tier 1.
    #[must_use]
    pub const fn build_cost(self) -> Cost {
        use ResourceKind::{Coal, Copper};
        match self {
            Self::Core => &[],
            Self::Drill => &[(Copper, 15)],
            Self::Conveyor => &[(Copper, 5)],
            Self::Turret => &[(Copper, 30)],
            Self::Wall => &[(Copper, 10)],
            Self::CoalGenerator => &[(Copper, 40), (Coal, 25)],
            Self::PowerPole => &[(Copper, 15)],
            Self::Battery => &[(Copper, 50), (Coal, 15)],
            Self::Reconstructor => &[(Copper, 70), (Coal, 40)],
        }
    }

    /// Cost to reach `tier`, if this kind can be upgraded that far.
    #[must_use]
    pub const fn upgrade_cost(self, tier: u8) -> Option<Cost> {
        use ResourceKind::{Coal, Copper};
        match (self, tier) {
            (Self::Drill, 2) => Some(&[(Copper, 40)]),
            (Self::Drill, 3) => Some(&[(Copper, 75), (Coal, 20)]),
            (Self::Conveyor, 2) => Some(&[(Copper, 15)]),
            (Self::Conveyor, 3) => Some(&[(Copper, 30), (Coal, 5)]),
            (Self::Turret, 2) => Some(&[(Copper, 50), (Coal, 20)]),
            (Self::Turret, 3) => Some(&[(Copper, 80), (Coal, 50)]),
            _ => None,
        }
    }

    /// Highest tier this kind can reach.
    #[must_use]
    pub const fn max_tier(self) -> u8 {
        match self {
            Self::Drill | Self::Conveyor | Self::Turret => MAX_TIER,
            _ => 1,
        }
    }

    /// Max hp at `tier`.
    #[must_use]
    pub fn max_hp(self, tier: u8) -> f32 {
        match self {
            Self::Core => stats::CORE_HP,
            Self::Drill => stats::drill(tier).max_hp,
            Self::Conveyor => stats::conveyor(tier).max_hp,
            Self::Turret => stats::turret(tier).max_hp,
            Self::Wall => stats::WALL_HP,
            Self::CoalGenerator => stats::GENERATOR_HP,
            Self::PowerPole => stats::POWER_POLE_HP,
            Self::Battery => stats::BATTERY_HP,
            Self::Reconstructor => stats::RECONSTRUCTOR_HP,
        }
    }

    /// How attractive this kind is to attacking enemies. Higher wins.
    #[must_use]
    pub const fn attack_priority(self) -> u8 {
        match self {
            Self::Core => 10,
            Self::Turret => 8,
            Self::Reconstructor => 7,
            Self::CoalGenerator | Self::Battery | Self::Drill => 5,
            Self::Wall => 4,
            Self::PowerPole => 2,
            Self::Conveyor => 1,
        }
    }
}

/// Kind-specific structure state.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    /// See [`StructureKind::Core`].
    Core,
    /// See [`StructureKind::Drill`].
    Drill(Drill),
    /// See [`StructureKind::Conveyor`].
    Conveyor(Conveyor),
    /// See [`StructureKind::Turret`].
    Turret(Turret),
    /// See [`StructureKind::Wall`].
    Wall,
    /// See [`StructureKind::CoalGenerator`].
    CoalGenerator(CoalGenerator),
    /// See [`StructureKind::PowerPole`].
    PowerPole,
    /// See [`StructureKind::Battery`].
    Battery(Battery),
    /// See [`StructureKind::Reconstructor`].
    Reconstructor(Reconstructor),
}

impl Variant {
    /// Fresh variant state for `kind`.
    #[must_use]
    pub fn new(kind: StructureKind, orientation: Orientation) -> Self {
        match kind {
            StructureKind::Core => Self::Core,
            StructureKind::Drill => Self::Drill(Drill::default()),
            StructureKind::Conveyor => Self::Conveyor(Conveyor::new(orientation)),
            StructureKind::Turret => Self::Turret(Turret::default()),
            StructureKind::Wall => Self::Wall,
            StructureKind::CoalGenerator => Self::CoalGenerator(CoalGenerator::default()),
            StructureKind::PowerPole => Self::PowerPole,
            StructureKind::Battery => Self::Battery(Battery::default()),
            StructureKind::Reconstructor => Self::Reconstructor(Reconstructor::default()),
        }
    }

    /// Kind tag of this variant.
    #[must_use]
    pub const fn kind(&self) -> StructureKind {
        match self {
            Self::Core => StructureKind::Core,
            Self::Drill(_) => StructureKind::Drill,
            Self::Conveyor(_) => StructureKind::Conveyor,
            Self::Turret(_) => StructureKind::Turret,
            Self::Wall => StructureKind::Wall,
            Self::CoalGenerator(_) => StructureKind::CoalGenerator,
            Self::PowerPole => StructureKind::PowerPole,
            Self::Battery(_) => StructureKind::Battery,
            Self::Reconstructor(_) => StructureKind::Reconstructor,
        }
    }
}

/// A building on the grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Structure {
    /// Network id.
    pub id: StructureId,
    /// Occupied tile.
    pub pos: GridPos,
    /// Current hit points.
    pub hp: f32,
    /// Maximum hit points at the current tier.
    pub max_hp: f32,
    /// Current tier, `1..=MAX_TIER`.
    pub tier: u8,
    /// Consumers: supplied by a sufficient network this power step.
    pub is_powered: bool,
    /// Nodes: part of a discovered network this power step.
    pub is_on_grid: bool,
    /// Nodes: tiles of directly linked nodes.
    pub power_links: Vec<GridPos>,
    /// Consumers: tile of the node feeding this consumer.
    pub power_source: Option<GridPos>,
    /// Marked when hp reached zero; removed at cleanup.
    pub destroyed: bool,
    /// Kind-specific state.
    pub variant: Variant,
}

impl Structure {
    /// New tier 1 structure at full hp.
    #[must_use]
    pub fn new(kind: StructureKind, pos: GridPos, orientation: Orientation) -> Self {
        let max_hp = kind.max_hp(1);
        Self {
            id: StructureId::for_placement(kind, pos),
            pos,
            hp: max_hp,
            max_hp,
            tier: 1,
            is_powered: false,
            is_on_grid: false,
            power_links: Vec::new(),
            power_source: None,
            destroyed: false,
            variant: Variant::new(kind, orientation),
        }
    }

    /// Kind of this structure.
    #[must_use]
    pub const fn kind(&self) -> StructureKind {
        self.variant.kind()
    }

    /// World-space center.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        self.pos.center()
    }

    /// Generators, poles and batteries form the power graph.
    #[must_use]
    pub const fn is_power_node(&self) -> bool {
        matches!(
            self.variant,
            Variant::CoalGenerator(_) | Variant::PowerPole | Variant::Battery(_)
        )
    }

    /// True while a generator is burning fuel.
    #[must_use]
    pub const fn is_power_source(&self) -> bool {
        match &self.variant {
            Variant::CoalGenerator(g) => g.is_generating,
            _ => false,
        }
    }

    /// Batteries.
    #[must_use]
    pub const fn is_power_storage(&self) -> bool {
        matches!(self.variant, Variant::Battery(_))
    }

    /// Reconstructors and tier 3 turrets draw power.
    #[must_use]
    pub const fn is_power_consumer(&self) -> bool {
        match self.variant {
            Variant::Reconstructor(_) => true,
            Variant::Turret(_) => self.tier >= MAX_TIER,
            _ => false,
        }
    }

    /// Declared power draw; zero for non-consumers.
    #[must_use]
    pub fn power_consumption(&self) -> f32 {
        match self.variant {
            Variant::Reconstructor(_) => stats::RECONSTRUCTOR_POWER_DRAW,
            Variant::Turret(_) if self.tier >= MAX_TIER => stats::TURRET_POWER_DRAW,
            _ => 0.0,
        }
    }

    /// Power produced while active.
    #[must_use]
    pub fn power_generation(&self) -> f32 {
        if self.is_power_source() {
            stats::GENERATOR_OUTPUT
        } else {
            0.0
        }
    }

    /// Cost of the next tier, if any.
    #[must_use]
    pub fn next_upgrade_cost(&self) -> Option<Cost> {
        if self.tier >= self.kind().max_tier() {
            return None;
        }
        self.kind().upgrade_cost(self.tier + 1)
    }

    /// Raise the tier by one and rescale hp to keep the hp ratio.
    ///
    /// Callers check [`Self::next_upgrade_cost`] first.
    pub fn apply_upgrade(&mut self) {
        let ratio = if self.max_hp > 0.0 {
            self.hp / self.max_hp
        } else {
            1.0
        };
        self.tier = (self.tier + 1).min(MAX_TIER);
        self.max_hp = self.kind().max_hp(self.tier);
        self.hp = (self.max_hp * ratio).min(self.max_hp);
        if self.max_hp > 0.0 {
            self.hp = self.hp.max(1.0);
        }

        let tier = self.tier;
        match &mut self.variant {
            Variant::Conveyor(c) => c.clamp_to_capacity(tier),
            Variant::Turret(t) => t.ammo = 0,
            _ => {}
        }
    }

    /// Apply damage. Returns true if this call destroyed the structure.
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

    /// Offer one item. Returns true if the structure took it.
    ///
    /// The core deposits straight into `resources`.
    pub fn accept_item(&mut self, item: ResourceKind, resources: &mut ResourceMap) -> bool {
        if self.destroyed {
            return false;
        }
        let tier = self.tier;
        match &mut self.variant {
            Variant::Core => {
                resources.add(item, 1);
                true
            }
            Variant::Conveyor(c) => c.accept(item, tier),
            Variant::Turret(t) => t.accept(item, tier),
            Variant::CoalGenerator(g) => g.accept(item),
            _ => false,
        }
    }

    /// Run one tick of the variant's behaviour.
    ///
    /// The structure has been taken out of the registry while this runs, so
    /// lookups through `world` never see it.
    pub(crate) fn update(&mut self, world: &mut World, dt: f32) {
        if self.destroyed {
            return;
        }
        let (pos, tier, powered) = (self.pos, self.tier, self.is_powered);
        match &mut self.variant {
            Variant::Drill(d) => d.update(pos, tier, world, dt),
            Variant::Conveyor(c) => c.update(pos, tier, world, dt),
            Variant::Turret(t) => t.update(pos, tier, powered, world, dt),
            Variant::CoalGenerator(g) => g.update(dt),
            Variant::Battery(b) => b.update(),
            Variant::Reconstructor(r) => r.update(pos, powered, world, dt),
            Variant::Core | Variant::Wall | Variant::PowerPole => {}
        }
    }

    /// Cosmetic advance on replicas: conveyor items keep sliding.
    pub(crate) fn interpolate(&mut self, dt: f32) {
        let tier = self.tier;
        if let Variant::Conveyor(c) = &mut self.variant {
            c.advance_cosmetic(tier, dt);
        }
    }

    /// Wire representation of this structure.
    #[must_use]
    pub fn state(&self) -> StructureState {
        StructureState {
            net_id: self.id.clone(),
            gx: self.pos.gx,
            gy: self.pos.gy,
            hp: self.hp,
            max_hp: self.max_hp,
            tier: self.tier,
            is_powered: self.is_powered,
            is_on_grid: self.is_on_grid,
            connected_nodes_coords: self.power_links.clone(),
            power_source_coords: self.power_source,
            detail: StructureDetail::of(&self.variant),
        }
    }

    /// Build a structure from its wire representation.
    pub fn from_state(state: &StructureState) -> Result<Self> {
        let kind = state.detail.kind();
        let pos = GridPos::new(state.gx, state.gy);
        let orientation = match &state.detail {
            StructureDetail::Conveyor { orientation, .. } => *orientation,
            _ => Orientation::default(),
        };
        let mut structure = Self::new(kind, pos, orientation);
        structure.id = state.net_id.clone();
        structure.apply_state(state)?;
        Ok(structure)
    }

    /// Overwrite synced fields from `state`. Transient timers are kept.
    ///
    /// Fails without modifying `self` if the kind differs or the values are out
    /// of range.
    pub fn apply_state(&mut self, state: &StructureState) -> Result<()> {
        if state.detail.kind() != self.kind() {
            return Err(GameError::InvalidState(format!(
                "structure {} is {:?}, state is {:?}",
                self.id,
                self.kind(),
                state.detail.kind()
            )));
        }
        if !(1..=MAX_TIER).contains(&state.tier) {
            return Err(GameError::InvalidState(format!(
                "structure {} has tier {}",
                state.net_id, state.tier
            )));
        }
        if !state.hp.is_finite() || !state.max_hp.is_finite() {
            return Err(GameError::InvalidState(format!(
                "structure {} has non-finite hp",
                state.net_id
            )));
        }

        self.hp = state.hp;
        self.max_hp = state.max_hp;
        self.tier = state.tier;
        self.is_powered = state.is_powered;
        self.is_on_grid = state.is_on_grid;
        self.power_links.clone_from(&state.connected_nodes_coords);
        self.power_source = state.power_source_coords;
        state.detail.apply_to(&mut self.variant);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_from_coordinates_and_code() {
        let id = StructureId::for_placement(StructureKind::Battery, GridPos::new(4, 11));
        assert_eq!(id.as_str(), "4_11_9");
    }

    #[test]
    fn test_role_flags() {
        let pos = GridPos::new(1, 1);
        let pole = Structure::new(StructureKind::PowerPole, pos, Orientation::East);
        assert!(pole.is_power_node());
        assert!(!pole.is_power_source());

        let mut turret = Structure::new(StructureKind::Turret, pos, Orientation::East);
        assert!(!turret.is_power_consumer());
        turret.apply_upgrade();
        turret.apply_upgrade();
        assert!(turret.is_power_consumer());
        assert_eq!(turret.power_consumption(), stats::TURRET_POWER_DRAW);

        let recon = Structure::new(StructureKind::Reconstructor, pos, Orientation::East);
        assert!(recon.is_power_consumer());
        assert!(!recon.is_power_node());
    }

    #[test]
    fn test_upgrade_preserves_hp_ratio() {
        let mut drill = Structure::new(StructureKind::Drill, GridPos::new(0, 0), Orientation::East);
        drill.hp = 50.0;
        drill.apply_upgrade();
        assert_eq!(drill.tier, 2);
        assert_eq!(drill.max_hp, 140.0);
        assert!((drill.hp - 70.0).abs() < 1e-4);
    }

    #[test]
    fn test_upgrade_keeps_at_least_one_hp() {
        let mut conveyor =
            Structure::new(StructureKind::Conveyor, GridPos::new(0, 0), Orientation::East);
        conveyor.hp = 0.001;
        conveyor.apply_upgrade();
        assert_eq!(conveyor.hp, 1.0);
    }

    #[test]
    fn test_upgrade_cost_table() {
        let wall = Structure::new(StructureKind::Wall, GridPos::new(0, 0), Orientation::East);
        assert!(wall.next_upgrade_cost().is_none());

        let mut turret = Structure::new(StructureKind::Turret, GridPos::new(0, 0), Orientation::East);
        assert_eq!(
            turret.next_upgrade_cost(),
            Some(&[(ResourceKind::Copper, 50), (ResourceKind::Coal, 20)][..])
        );
        turret.apply_upgrade();
        turret.apply_upgrade();
        assert!(turret.next_upgrade_cost().is_none());
    }

    #[test]
    fn test_turret_upgrade_resets_ammo() {
        let mut turret = Structure::new(StructureKind::Turret, GridPos::new(0, 0), Orientation::East);
        let mut pool = ResourceMap::default();
        assert!(turret.accept_item(ResourceKind::Copper, &mut pool));
        turret.apply_upgrade();
        match &turret.variant {
            Variant::Turret(t) => assert_eq!(t.ammo, 0),
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn test_core_accepts_into_pool() {
        let mut core = Structure::new(StructureKind::Core, GridPos::new(5, 5), Orientation::East);
        let mut pool = ResourceMap::new(0, 0);
        assert!(core.accept_item(ResourceKind::Coal, &mut pool));
        assert_eq!(pool.get(ResourceKind::Coal), 1);
    }

    #[test]
    fn test_take_damage_marks_destroyed_once() {
        let mut wall = Structure::new(StructureKind::Wall, GridPos::new(0, 0), Orientation::East);
        assert!(!wall.take_damage(100.0));
        assert!(wall.take_damage(400.0));
        assert!(wall.destroyed);
        assert!(!wall.take_damage(10.0));
    }

    #[test]
    fn test_apply_state_rejects_kind_mismatch() {
        let wall = Structure::new(StructureKind::Wall, GridPos::new(0, 0), Orientation::East);
        let mut pole = Structure::new(StructureKind::PowerPole, GridPos::new(0, 0), Orientation::East);
        let before = pole.clone();
        assert!(pole.apply_state(&wall.state()).is_err());
        assert_eq!(pole, before);
    }
}
