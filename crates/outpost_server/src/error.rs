//! Error types for transport, sessions and persistence.

use std::path::PathBuf;

use outpost_core::error::GameError;
use thiserror::Error;

/// Result type alias using [`NetError`].
pub type Result<T> = std::result::Result<T, NetError>;

/// Everything that can go wrong outside the simulation itself.
#[derive(Debug, Error)]
pub enum NetError {
    /// Socket or file I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The simulation rejected a snapshot or message.
    #[error(transparent)]
    Game(#[from] GameError),

    /// A frame header was not a decimal length.
    #[error("Malformed frame header {0:?}")]
    BadHeader(String),

    /// A frame exceeded the size limit.
    #[error("Frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced or actual length.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// The peer closed the connection.
    #[error("Connection closed")]
    Closed,

    /// Connecting took longer than the configured timeout.
    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    /// The server turned the connection away.
    #[error("Server refused connection: {0}")]
    Refused(String),

    /// Config file not found.
    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Config file was not valid RON.
    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] ron::error::SpannedError),

    /// Config values out of range.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}
