//! Wire messages.
//!
//! Every payload is a JSON object tagged by `type`. Server messages carry their
//! body in `data` (or a dedicated field such as `net_id`/`ids`); client inputs
//! carry an intent in `payload`, itself tagged by `action`.
//!
//! Full snapshots are decoded leniently (see [`FullSnapshot::from_value`]) so a
//! single malformed entity never drops the whole re-sync.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enemy::{EnemyId, EnemyState};
use crate::error::{GameError, Result};
use crate::grid::Orientation;
use crate::player::{PlayerId, PlayerState};
use crate::projectile::{ProjectileId, ProjectileState};
use crate::resources::ResourceMap;
use crate::snapshot::FullSnapshot;
use crate::structures::{StructureId, StructureKind, StructureState};
use crate::waves::WaveState;

/// Body of `assign_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedId {
    /// The receiver's player id.
    pub id: PlayerId,
}

/// Terminal outcome carried by `game_status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminalStatus {
    /// Core destroyed.
    Over,
    /// All waves survived.
    Won,
}

/// Authoritative side to replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Tells a freshly joined client its player id.
    AssignId {
        /// Assigned id.
        data: AssignedId,
    },
    /// Snapshot sent once after joining.
    InitialState {
        /// Snapshot.
        data: Box<FullSnapshot>,
    },
    /// Periodic full re-sync.
    StateUpdate {
        /// Snapshot.
        data: Box<FullSnapshot>,
    },
    /// A structure was placed.
    StructureAdd {
        /// New structure.
        data: StructureState,
    },
    /// A structure changed, e.g. was upgraded.
    StructureUpdate {
        /// Updated structure.
        data: StructureState,
    },
    /// A structure was removed by a player.
    StructureRemove {
        /// Removed id.
        net_id: StructureId,
    },
    /// Structures destroyed during a tick.
    StructuresRemove {
        /// Removed ids.
        ids: Vec<StructureId>,
    },
    /// An enemy spawned.
    EnemyAdd {
        /// New enemy.
        data: EnemyState,
    },
    /// Enemies destroyed during a tick.
    EnemiesRemove {
        /// Removed ids.
        ids: Vec<EnemyId>,
    },
    /// A projectile was fired.
    ProjectileAdd {
        /// New projectile.
        data: ProjectileState,
    },
    /// Projectiles gone during a tick.
    ProjectilesRemove {
        /// Removed ids.
        ids: Vec<ProjectileId>,
    },
    /// Another player joined.
    PlayerJoin {
        /// New player.
        data: PlayerState,
    },
    /// A player left.
    PlayerLeave {
        /// Departed player.
        player_id: PlayerId,
    },
    /// Resource pool replaced.
    ResourceUpdate {
        /// New pool.
        data: ResourceMap,
    },
    /// Wave state replaced.
    WaveUpdate {
        /// New wave state.
        data: WaveState,
    },
    /// The game ended.
    GameStatus {
        /// Outcome.
        status: TerminalStatus,
    },
    /// Connection-level rejection, e.g. server full.
    Error {
        /// Human readable reason.
        message: String,
    },
}

impl ServerMessage {
    /// Short tag for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AssignId { .. } => "assign_id",
            Self::InitialState { .. } => "initial_state",
            Self::StateUpdate { .. } => "state_update",
            Self::StructureAdd { .. } => "structure_add",
            Self::StructureUpdate { .. } => "structure_update",
            Self::StructureRemove { .. } => "structure_remove",
            Self::StructuresRemove { .. } => "structures_remove",
            Self::EnemyAdd { .. } => "enemy_add",
            Self::EnemiesRemove { .. } => "enemies_remove",
            Self::ProjectileAdd { .. } => "projectile_add",
            Self::ProjectilesRemove { .. } => "projectiles_remove",
            Self::PlayerJoin { .. } => "player_join",
            Self::PlayerLeave { .. } => "player_leave",
            Self::ResourceUpdate { .. } => "resource_update",
            Self::WaveUpdate { .. } => "wave_update",
            Self::GameStatus { .. } => "game_status",
            Self::Error { .. } => "error",
        }
    }

    /// Decode a received payload.
    ///
    /// Snapshot messages go through the lenient snapshot decoder; everything
    /// else must match its schema exactly.
    pub fn from_value(value: Value) -> Result<Self> {
        let tag = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match tag {
            "initial_state" | "state_update" => {
                let body = value.get("data").cloned().ok_or(GameError::Decode {
                    what: "snapshot message",
                    message: "missing data".to_string(),
                })?;
                let snapshot = Box::new(FullSnapshot::from_value(body)?);
                Ok(if tag == "initial_state" {
                    Self::InitialState { data: snapshot }
                } else {
                    Self::StateUpdate { data: snapshot }
                })
            }
            _ => serde_json::from_value(value).map_err(|e| GameError::Decode {
                what: "server message",
                message: e.to_string(),
            }),
        }
    }

    /// Decode from payload bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).map_err(|e| GameError::Decode {
            what: "server message",
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }
}

/// A player's request to act on the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "snake_case")]
pub enum Intent {
    /// Set the movement direction. Zero stops.
    Move {
        /// X component.
        x: f32,
        /// Y component.
        y: f32,
    },
    /// Build a structure.
    Place {
        /// What to build.
        #[serde(rename = "type")]
        kind: StructureKind,
        /// Tile x.
        gx: i32,
        /// Tile y.
        gy: i32,
        /// Facing; only conveyors care.
        #[serde(default)]
        orient: Orientation,
    },
    /// Demolish the structure on a tile.
    Remove {
        /// Tile x.
        gx: i32,
        /// Tile y.
        gy: i32,
    },
    /// Upgrade the structure on a tile.
    Upgrade {
        /// Tile x.
        gx: i32,
        /// Tile y.
        gy: i32,
    },
}

/// Replica to authoritative side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First message on a new connection.
    JoinRequest {
        /// Display name.
        name: String,
        /// Palette index.
        #[serde(default)]
        color_idx: u32,
    },
    /// A player intent.
    Input {
        /// The intent.
        payload: Intent,
    },
}

impl ClientMessage {
    /// Decode from payload bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| GameError::Decode {
            what: "client message",
            message: e.to_string(),
        })
    }
}
