//! Error types for the game simulation.
//!
//! Two families live here:
//! - [`GameError`] for genuine failures (undecodable snapshots, bad save data).
//! - [`ActionRejected`] for expected gameplay rejections. These never escape the
//!   public action surface as errors; the world logs them and reports `false`.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all game simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// A snapshot or message payload could not be decoded.
    #[error("Failed to decode {what}: {message}")]
    Decode {
        /// What was being decoded.
        what: &'static str,
        /// Decoder error message.
        message: String,
    },

    /// A terrain key was not of the form `"gx,gy"`.
    #[error("Invalid terrain key '{0}'")]
    InvalidTerrainKey(String),

    /// An entity state referenced coordinates outside the grid.
    #[error("Position ({gx},{gy}) is outside the {width}x{height} grid")]
    OutOfBounds {
        /// Grid x.
        gx: i32,
        /// Grid y.
        gy: i32,
        /// Grid width.
        width: u32,
        /// Grid height.
        height: u32,
    },

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Serialization failed.
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Reason a player action was refused.
///
/// Rejections leave the world untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ActionRejected {
    /// The acting player does not exist.
    #[error("unknown player")]
    UnknownPlayer,
    /// Only replicas reach this: they never mutate the world on intent.
    #[error("not the authoritative world")]
    NotAuthoritative,
    /// The structure kind cannot be built by players.
    #[error("structure kind is not buildable")]
    NotBuildable,
    /// Target tile lies outside the grid.
    #[error("target outside the grid")]
    OutOfBounds,
    /// The resource pool does not cover the cost.
    #[error("insufficient resources")]
    InsufficientResources,
    /// Target tile is farther than the build radius from the player.
    #[error("target outside build radius")]
    OutOfBuildRange,
    /// The tile cannot host this structure.
    #[error("illegal tile for this structure")]
    IllegalTile,
    /// Nothing removable or upgradable at the target tile.
    #[error("no structure at target")]
    NothingThere,
    /// The core cannot be removed.
    #[error("structure cannot be removed")]
    NotRemovable,
    /// The structure is at max tier or has no cost for the next tier.
    #[error("structure cannot be upgraded")]
    CannotUpgrade,
}
