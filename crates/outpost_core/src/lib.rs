//! # Outpost Core
//!
//! Authoritative simulation for a cooperative factory/tower-defense game.
//!
//! This crate contains **only** game logic:
//! - No rendering
//! - No sockets or files
//! - No wall clock (callers pass `dt`)
//! - No system randomness (a seeded `ChaCha8Rng` owned by the world)
//!
//! The same [`simulation::Simulation`] runs single player, host and dedicated
//! server games as the authoritative side, and client games as a replica fed
//! by [`protocol::ServerMessage`]s.
//!
//! ## Crate Structure
//!
//! - [`world`] - Tile grid, registries and validated player actions
//! - [`structures`] - Structure variants and their per-tick behaviour
//! - [`enemy`], [`projectile`], [`player`] - Mobile entities
//! - [`power`] - Power network discovery and supply/demand balancing
//! - [`waves`] - Wave scheduling
//! - [`simulation`] - Tick loop
//! - [`snapshot`], [`sync`], [`protocol`] - Synchronization

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod config;
pub mod enemy;
pub mod error;
pub mod grid;
pub mod math;
pub mod player;
pub mod power;
pub mod projectile;
pub mod protocol;
pub mod resources;
pub mod simulation;
pub mod snapshot;
pub mod structures;
pub mod sync;
pub mod waves;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::WorldConfig;
    pub use crate::enemy::{Enemy, EnemyId, EnemyState};
    pub use crate::error::{ActionRejected, GameError, Result};
    pub use crate::grid::{GridPos, Orientation};
    pub use crate::math::{Vec2, TILE_SIZE};
    pub use crate::player::{Player, PlayerId, PlayerProfile, PlayerState};
    pub use crate::power::{NetworkStats, PowerReport};
    pub use crate::projectile::{Projectile, ProjectileId, ProjectileState};
    pub use crate::protocol::{ClientMessage, Intent, ServerMessage, TerminalStatus};
    pub use crate::resources::{ResourceKind, ResourceMap};
    pub use crate::simulation::{Role, Simulation, TickEvents};
    pub use crate::snapshot::{FullSnapshot, SessionMode};
    pub use crate::structures::{Structure, StructureId, StructureKind, StructureState, Variant};
    pub use crate::waves::{WaveDirector, WaveState};
    pub use crate::world::{GameStatus, World};
}
