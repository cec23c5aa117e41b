//! Server configuration.
//!
//! Defaults match a LAN game. A RON file can override any subset of fields,
//! and the CLI overrides the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use outpost_core::config::WorldConfig;
use outpost_core::simulation::TICK_RATE;
use serde::{Deserialize, Serialize};

use crate::error::{NetError, Result};

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 5555;
/// Default player cap, host included.
pub const DEFAULT_MAX_PLAYERS: usize = 10;
/// Default full re-sync interval in seconds (20 Hz).
pub const DEFAULT_SNAPSHOT_INTERVAL: f32 = 0.05;
/// Fastest allowed re-sync interval (100 Hz).
pub const MIN_SNAPSHOT_INTERVAL: f32 = 0.01;
/// Slowest allowed re-sync interval (5 Hz).
pub const MAX_SNAPSHOT_INTERVAL: f32 = 0.2;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind or connect to.
    pub bind_address: String,
    /// Port to listen on.
    pub port: u16,
    /// Maximum players per game, host included.
    pub max_players: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Seconds between full `state_update` broadcasts.
    pub snapshot_interval: f32,
    /// Seconds a client waits for a connection.
    pub connect_timeout: f32,
    /// Save file written on shutdown.
    pub save_path: PathBuf,
    /// Parameters for newly generated worlds.
    pub world: WorldConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
            tick_rate: TICK_RATE,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            connect_timeout: 5.0,
            save_path: PathBuf::from("savegame.json"),
            world: WorldConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from a RON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(NetError::ConfigNotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_ron_str(&contents)
    }

    /// Parse from a RON string.
    pub fn from_ron_str(ron: &str) -> Result<Self> {
        let config: ServerConfig = ron::from_str(ron)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_players == 0 {
            return Err(NetError::InvalidConfig("max_players must be at least 1".to_string()));
        }
        if self.tick_rate == 0 {
            return Err(NetError::InvalidConfig("tick_rate must be positive".to_string()));
        }
        if !(self.connect_timeout.is_finite() && self.connect_timeout > 0.0) {
            return Err(NetError::InvalidConfig("connect_timeout must be positive".to_string()));
        }
        self.world.validate()?;
        Ok(())
    }

    /// `host:port` for binding or connecting.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    /// Seconds per simulation tick.
    #[must_use]
    pub fn tick_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }

    /// Simulation tick period.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f32(self.tick_dt())
    }

    /// Re-sync period, clamped to the supported range.
    #[must_use]
    pub fn snapshot_interval(&self) -> Duration {
        let secs = if self.snapshot_interval.is_finite() {
            self.snapshot_interval
                .clamp(MIN_SNAPSHOT_INTERVAL, MAX_SNAPSHOT_INTERVAL)
        } else {
            DEFAULT_SNAPSHOT_INTERVAL
        };
        Duration::from_secs_f32(secs)
    }

    /// Client connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs_f32(self.connect_timeout.max(0.0))
    }

    /// Remote connections accepted alongside the host.
    #[must_use]
    pub fn max_remote_peers(&self) -> usize {
        self.max_players.saturating_sub(1)
    }
}
