//! World configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Parameters fixed at world creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Grid width in tiles.
    pub grid_width: u32,
    /// Grid height in tiles.
    pub grid_height: u32,
    /// Seed for the world PRNG.
    pub seed: u64,
    /// Number of waves to survive.
    pub max_waves: u32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            grid_width: 40,
            grid_height: 19,
            seed: 0x5EED,
            max_waves: 20,
        }
    }
}

impl WorldConfig {
    /// Reject configurations the grid cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.grid_width == 0 || self.grid_height == 0 {
            return Err(GameError::InvalidState(format!(
                "grid must be non-empty, got {}x{}",
                self.grid_width, self.grid_height
            )));
        }
        if self.grid_width > i32::MAX as u32 || self.grid_height > i32::MAX as u32 {
            return Err(GameError::InvalidState("grid too large".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = WorldConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!((config.grid_width, config.grid_height), (40, 19));
        assert_eq!(config.max_waves, 20);
    }

    #[test]
    fn test_zero_sized_grid_rejected() {
        let config = WorldConfig {
            grid_width: 0,
            ..WorldConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: WorldConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.grid_width, 40);
    }
}
