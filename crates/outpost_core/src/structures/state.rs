//! Wire representation of structures.

use serde::{Deserialize, Serialize};

use super::{Battery, CoalGenerator, Conveyor, Drill, StructureId, StructureKind, Turret, Variant};
use crate::grid::{GridPos, Orientation};
use crate::resources::ResourceKind;

/// Synced state of one structure, as found in snapshots and
/// `structure_add` / `structure_update` messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureState {
    /// Network id.
    pub net_id: StructureId,
    /// Column.
    pub gx: i32,
    /// Row.
    pub gy: i32,
    /// Current hp.
    pub hp: f32,
    /// Max hp.
    pub max_hp: f32,
    /// Tier.
    pub tier: u8,
    /// Consumer powered flag.
    #[serde(default)]
    pub is_powered: bool,
    /// Node on-grid flag.
    #[serde(default)]
    pub is_on_grid: bool,
    /// Linked node tiles.
    #[serde(default)]
    pub connected_nodes_coords: Vec<GridPos>,
    /// Feeding node tile.
    #[serde(default)]
    pub power_source_coords: Option<GridPos>,
    /// Kind tag plus kind-specific fields.
    #[serde(flatten)]
    pub detail: StructureDetail,
}

/// Kind-specific synced fields, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureDetail {
    /// Core.
    Core,
    /// Drill.
    Drill {
        /// Mined units waiting for output.
        res_held: u32,
        /// Patch kind the drill is bound to.
        #[serde(default)]
        res_type: Option<ResourceKind>,
    },
    /// Conveyor.
    Conveyor {
        /// Facing.
        orientation: Orientation,
        /// Carried item kind.
        #[serde(default)]
        item_type: Option<ResourceKind>,
        /// Carried item count.
        #[serde(default)]
        item_count: u32,
        /// Progress of the front item, `0.0..=1.0`.
        #[serde(default)]
        item_progress: f32,
    },
    /// Turret.
    Turret {
        /// Loaded ammo.
        ammo: u32,
        /// Aim angle in radians.
        #[serde(default)]
        angle: f32,
    },
    /// Wall.
    Wall,
    /// Coal generator.
    CoalGenerator {
        /// Coal buffered.
        coal_buffer: u32,
        /// Burning flag.
        #[serde(default)]
        is_generating: bool,
    },
    /// Power pole.
    PowerPole,
    /// Battery.
    Battery {
        /// Stored charge.
        charge: f32,
        /// Charged during the last power step.
        #[serde(default)]
        is_charging: bool,
        /// Discharged during the last power step.
        #[serde(default)]
        is_discharging: bool,
    },
    /// Reconstructor.
    Reconstructor,
}

impl StructureDetail {
    /// Detail for a variant.
    #[must_use]
    pub fn of(variant: &Variant) -> Self {
        match variant {
            Variant::Core => Self::Core,
            Variant::Drill(d) => Self::Drill {
                res_held: d.held,
                res_type: d.resource,
            },
            Variant::Conveyor(c) => Self::Conveyor {
                orientation: c.orientation,
                item_type: c.item,
                item_count: c.count,
                item_progress: c.progress,
            },
            Variant::Turret(t) => Self::Turret {
                ammo: t.ammo,
                angle: t.angle,
            },
            Variant::Wall => Self::Wall,
            Variant::CoalGenerator(g) => Self::CoalGenerator {
                coal_buffer: g.buffer,
                is_generating: g.is_generating,
            },
            Variant::PowerPole => Self::PowerPole,
            Variant::Battery(b) => Self::Battery {
                charge: b.charge,
                is_charging: b.is_charging,
                is_discharging: b.is_discharging,
            },
            Variant::Reconstructor(_) => Self::Reconstructor,
        }
    }

    /// Kind tag.
    #[must_use]
    pub const fn kind(&self) -> StructureKind {
        match self {
            Self::Core => StructureKind::Core,
            Self::Drill { .. } => StructureKind::Drill,
            Self::Conveyor { .. } => StructureKind::Conveyor,
            Self::Turret { .. } => StructureKind::Turret,
            Self::Wall => StructureKind::Wall,
            Self::CoalGenerator { .. } => StructureKind::CoalGenerator,
            Self::PowerPole => StructureKind::PowerPole,
            Self::Battery { .. } => StructureKind::Battery,
            Self::Reconstructor => StructureKind::Reconstructor,
        }
    }

    /// Copy synced fields onto a variant of the same kind. Mismatches are ignored.
    pub(crate) fn apply_to(&self, variant: &mut Variant) {
        match (self, variant) {
            (Self::Drill { res_held, res_type }, Variant::Drill(d)) => {
                *d = Drill {
                    held: *res_held,
                    resource: *res_type,
                    ..d.clone()
                };
            }
            (
                Self::Conveyor {
                    orientation,
                    item_type,
                    item_count,
                    item_progress,
                },
                Variant::Conveyor(c),
            ) => {
                *c = Conveyor {
                    orientation: *orientation,
                    item: if *item_count > 0 { *item_type } else { None },
                    count: *item_count,
                    progress: item_progress.clamp(0.0, 1.0),
                };
            }
            (Self::Turret { ammo, angle }, Variant::Turret(t)) => {
                *t = Turret {
                    ammo: *ammo,
                    angle: *angle,
                    ..t.clone()
                };
            }
            (
                Self::CoalGenerator {
                    coal_buffer,
                    is_generating,
                },
                Variant::CoalGenerator(g),
            ) => {
                *g = CoalGenerator {
                    buffer: *coal_buffer,
                    is_generating: *is_generating,
                    ..g.clone()
                };
            }
            (
                Self::Battery {
                    charge,
                    is_charging,
                    is_discharging,
                },
                Variant::Battery(b),
            ) => {
                *b = Battery {
                    charge: *charge,
                    is_charging: *is_charging,
                    is_discharging: *is_discharging,
                };
                b.update();
            }
            _ => {}
        }
    }
}
