//! Save files.
//!
//! A save is the full snapshot, tagged with the session mode, written as
//! pretty JSON.

use std::path::Path;

use outpost_core::config::WorldConfig;
use outpost_core::player::PlayerProfile;
use outpost_core::snapshot::{FullSnapshot, SessionMode};
use outpost_core::world::World;
use tracing::{info, warn};

use crate::error::Result;

/// Write `world` to `path`.
pub fn save(path: &Path, world: &World, mode: SessionMode) -> Result<()> {
    let snapshot = world.full_snapshot().for_save(mode);
    let text = serde_json::to_string_pretty(&snapshot)?;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(path, text)?;
    info!(
        path = %path.display(),
        wave = snapshot.wave_number,
        structures = snapshot.structures.len(),
        "Game saved"
    );
    Ok(())
}

/// Read a save and rebuild an authoritative world from it.
pub fn load(path: &Path, config: WorldConfig, host: &PlayerProfile) -> Result<(World, Option<SessionMode>)> {
    let text = std::fs::read_to_string(path)?;
    let snapshot = FullSnapshot::from_json(&text)?;
    let mode = snapshot.game_mode_for_save;
    let world = World::restore(config, &snapshot, host)?;
    info!(
        path = %path.display(),
        wave = world.waves().number(),
        ?mode,
        "Game loaded"
    );
    Ok((world, mode))
}

/// [`load`], or a freshly generated world if there is no usable save.
pub fn load_or_generate(path: &Path, config: WorldConfig, host: &PlayerProfile) -> World {
    if !path.exists() {
        info!(path = %path.display(), "No save found, generating a new world");
        return World::generate(config, host);
    }
    match load(path, config.clone(), host) {
        Ok((world, _)) => world,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not load save, generating a new world");
            World::generate(config, host)
        }
    }
}
