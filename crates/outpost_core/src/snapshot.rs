//! Full snapshots: construction, lenient decoding and reconciliation.
//!
//! The same [`FullSnapshot`] serves the join handshake, the periodic re-sync
//! and save files. Applying one reconciles every registry by id: entities in
//! both sets are updated in place, entities only in the snapshot are created
//! and entities only in the local world are removed.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WorldConfig;
use crate::enemy::{Enemy, EnemyId, EnemyState};
use crate::error::{GameError, Result};
use crate::grid::{Grid, GridPos};
use crate::math::{Vec2, TILE_SIZE};
use crate::player::{Player, PlayerId, PlayerProfile, PlayerState};
use crate::projectile::{Projectile, ProjectileId, ProjectileState};
use crate::resources::{ResourceKind, ResourceMap};
use crate::structures::stats::CORE_HP;
use crate::structures::{Structure, StructureId, StructureState};
use crate::waves::WaveState;
use crate::world::{GameStatus, World};

/// Which kind of session wrote a save file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionMode {
    /// Local game without networking.
    #[serde(rename = "sp")]
    SinglePlayer,
    /// Host of a networked game.
    #[serde(rename = "host")]
    Host,
}

/// Everything needed to rebuild a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullSnapshot {
    /// Resource pool.
    pub resources: ResourceMap,
    /// Current wave number.
    pub wave_number: u32,
    /// Seconds left in the current wave phase.
    pub wave_timer: f32,
    /// Whether a wave is running.
    pub in_wave: bool,
    /// Core destroyed.
    pub game_over: bool,
    /// All waves survived.
    pub game_won: bool,
    /// Players by id.
    #[serde(default)]
    pub players: BTreeMap<PlayerId, PlayerState>,
    /// Structures by id, core included. Terrain is not a structure.
    #[serde(default)]
    pub structures: BTreeMap<StructureId, StructureState>,
    /// Enemies by id.
    #[serde(default)]
    pub enemies: BTreeMap<EnemyId, EnemyState>,
    /// Projectiles by id.
    #[serde(default)]
    pub projectiles: BTreeMap<ProjectileId, ProjectileState>,
    /// Resource patches keyed `"gx,gy"`.
    #[serde(default)]
    pub base_terrain: BTreeMap<String, ResourceKind>,
    /// Core hp, 0 without a core.
    #[serde(default)]
    pub core_hp: f32,
    /// Core max hp.
    #[serde(default = "default_core_max_hp")]
    pub core_max_hp: f32,
    /// Next enemy id counter.
    #[serde(default)]
    pub next_enemy_id: u32,
    /// Next projectile id counter.
    #[serde(default)]
    pub next_projectile_id: u32,
    /// Grid width in tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_width: Option<u32>,
    /// Grid height in tiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_height: Option<u32>,
    /// Set only in save files.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_mode_for_save: Option<SessionMode>,
}

fn default_core_max_hp() -> f32 {
    CORE_HP
}

/// Top level of a snapshot with entity maps left undecoded.
#[derive(Deserialize)]
struct RawSnapshot {
    resources: ResourceMap,
    wave_number: u32,
    wave_timer: f32,
    in_wave: bool,
    #[serde(default)]
    game_over: bool,
    #[serde(default)]
    game_won: bool,
    #[serde(default)]
    players: BTreeMap<String, Value>,
    #[serde(default)]
    structures: BTreeMap<String, Value>,
    #[serde(default)]
    enemies: BTreeMap<String, Value>,
    #[serde(default)]
    projectiles: BTreeMap<String, Value>,
    #[serde(default)]
    base_terrain: BTreeMap<String, Value>,
    #[serde(default)]
    core_hp: f32,
    #[serde(default = "default_core_max_hp")]
    core_max_hp: f32,
    #[serde(default)]
    next_enemy_id: u32,
    #[serde(default)]
    next_projectile_id: u32,
    #[serde(default)]
    grid_width: Option<u32>,
    #[serde(default)]
    grid_height: Option<u32>,
    #[serde(default)]
    game_mode_for_save: Option<SessionMode>,
}

/// Decode every entry of an entity map, dropping the ones that do not parse.
fn decode_entries<K, T>(what: &'static str, raw: BTreeMap<String, Value>, key_of: impl Fn(&T) -> K) -> BTreeMap<K, T>
where
    K: Ord,
    T: DeserializeOwned,
{
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        match serde_json::from_value::<T>(value) {
            Ok(state) => {
                out.insert(key_of(&state), state);
            }
            Err(e) => warn!(what, key = %key, error = %e, "Skipping malformed snapshot entry"),
        }
    }
    out
}

impl FullSnapshot {
    /// Decode leniently: the top-level scalars must be present, but any single
    /// malformed entity or terrain entry is skipped with a warning.
    pub fn from_value(value: Value) -> Result<Self> {
        let raw: RawSnapshot = serde_json::from_value(value).map_err(|e| GameError::Decode {
            what: "snapshot",
            message: e.to_string(),
        })?;

        let base_terrain = raw
            .base_terrain
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<ResourceKind>(value) {
                Ok(kind) => Some((key, kind)),
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping malformed terrain entry");
                    None
                }
            })
            .collect();

        Ok(Self {
            resources: raw.resources,
            wave_number: raw.wave_number,
            wave_timer: raw.wave_timer,
            in_wave: raw.in_wave,
            game_over: raw.game_over,
            game_won: raw.game_won,
            players: decode_entries("player", raw.players, |p: &PlayerState| p.id),
            structures: decode_entries("structure", raw.structures, |s: &StructureState| s.net_id.clone()),
            enemies: decode_entries("enemy", raw.enemies, |e: &EnemyState| e.net_id),
            projectiles: decode_entries("projectile", raw.projectiles, |p: &ProjectileState| p.net_id),
            base_terrain,
            core_hp: raw.core_hp,
            core_max_hp: raw.core_max_hp,
            next_enemy_id: raw.next_enemy_id,
            next_projectile_id: raw.next_projectile_id,
            grid_width: raw.grid_width,
            grid_height: raw.grid_height,
            game_mode_for_save: raw.game_mode_for_save,
        })
    }

    /// Decode from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text).map_err(|e| GameError::Decode {
            what: "snapshot",
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Tag this snapshot as a save written by `mode`.
    #[must_use]
    pub fn for_save(mut self, mode: SessionMode) -> Self {
        self.game_mode_for_save = Some(mode);
        self
    }

    /// Wave fields as a [`WaveState`].
    #[must_use]
    pub fn wave_state(&self) -> WaveState {
        WaveState {
            number: self.wave_number,
            timer: self.wave_timer,
            in_wave: self.in_wave,
        }
    }
}

impl World {
    /// Snapshot of the whole world.
    #[must_use]
    pub fn full_snapshot(&self) -> FullSnapshot {
        let wave = self.waves.state();
        let core = self.core();
        FullSnapshot {
            resources: self.resources.clone(),
            wave_number: wave.number,
            wave_timer: wave.timer,
            in_wave: wave.in_wave,
            game_over: self.status == GameStatus::Over,
            game_won: self.status == GameStatus::Won,
            players: self.players.iter().map(|(id, p)| (*id, p.state())).collect(),
            structures: self.structures.iter().map(|(id, s)| (id.clone(), s.state())).collect(),
            enemies: self.enemies.iter().map(|(id, e)| (*id, e.state())).collect(),
            projectiles: self.projectiles.iter().map(|(id, p)| (*id, p.state())).collect(),
            base_terrain: self.terrain.iter().map(|(pos, kind)| (pos.to_string(), *kind)).collect(),
            core_hp: core.map_or(0.0, |c| c.hp),
            core_max_hp: core.map_or(CORE_HP, |c| c.max_hp),
            next_enemy_id: self.next_enemy_id,
            next_projectile_id: self.next_projectile_id,
            grid_width: Some(self.grid.width()),
            grid_height: Some(self.grid.height()),
            game_mode_for_save: None,
        }
    }

    /// Reconcile this world with `snapshot`.
    ///
    /// Entity-level problems are logged and skipped. Queued outgoing messages
    /// are discarded since they describe the replaced state.
    pub fn apply_full_snapshot(&mut self, snapshot: &FullSnapshot) {
        self.resize_for(snapshot);

        self.resources = snapshot.resources.clone();
        self.waves.apply_state(&snapshot.wave_state());
        self.status = if snapshot.game_over {
            GameStatus::Over
        } else if snapshot.game_won {
            GameStatus::Won
        } else {
            GameStatus::Running
        };
        self.next_enemy_id = snapshot.next_enemy_id;
        self.next_projectile_id = snapshot.next_projectile_id;

        self.terrain.clear();
        for (key, kind) in &snapshot.base_terrain {
            match key.parse::<GridPos>() {
                Ok(pos) if self.grid.in_bounds(pos) => {
                    self.terrain.insert(pos, *kind);
                }
                Ok(pos) => warn!(%pos, "Terrain outside grid, skipped"),
                Err(e) => warn!(error = %e, "Skipping terrain entry"),
            }
        }

        self.reconcile_players(&snapshot.players);
        self.reconcile_structures(&snapshot.structures);
        self.reconcile_enemies(&snapshot.enemies);
        self.reconcile_projectiles(&snapshot.projectiles);

        self.rebuild_power_lists();
        self.discard_outbox();
        debug!(
            structures = self.structures.len(),
            enemies = self.enemies.len(),
            projectiles = self.projectiles.len(),
            players = self.players.len(),
            "Applied full snapshot"
        );
    }

    fn resize_for(&mut self, snapshot: &FullSnapshot) {
        let (Some(width), Some(height)) = (snapshot.grid_width, snapshot.grid_height) else {
            return;
        };
        if width == 0 || height == 0 {
            warn!(width, height, "Ignoring empty grid size in snapshot");
            return;
        }
        if (width, height) == (self.grid.width(), self.grid.height()) {
            return;
        }
        info!(width, height, "Resizing grid to match snapshot");
        self.config.grid_width = width;
        self.config.grid_height = height;
        self.grid = Grid::new(width, height);
        self.structures.clear();
        self.core = None;
    }

    fn reconcile_players(&mut self, incoming: &BTreeMap<PlayerId, PlayerState>) {
        self.players.retain(|id, _| incoming.contains_key(id));
        for (id, state) in incoming {
            match self.players.get_mut(id) {
                Some(player) => player.apply_state(state),
                None => {
                    self.players.insert(*id, Player::from_state(state));
                }
            }
        }
        if let Some(max) = self.players.keys().max() {
            self.next_player_id = self.next_player_id.max(max.0 + 1);
        }
    }

    fn reconcile_structures(&mut self, incoming: &BTreeMap<StructureId, StructureState>) {
        let stale: Vec<StructureId> = self
            .structures
            .keys()
            .filter(|id| !incoming.contains_key(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.remove_structure_by_id(id);
        }

        for (id, state) in incoming {
            if let Some(existing) = self.structures.get_mut(id) {
                match existing.apply_state(state) {
                    Ok(()) => continue,
                    Err(e) => {
                        warn!(%id, error = %e, "Replacing structure that no longer matches");
                        self.remove_structure_by_id(id);
                    }
                }
            }
            match Structure::from_state(state) {
                Ok(structure) => {
                    self.insert_structure(structure);
                }
                Err(e) => warn!(%id, error = %e, "Skipping structure from snapshot"),
            }
        }
    }

    fn reconcile_enemies(&mut self, incoming: &BTreeMap<EnemyId, EnemyState>) {
        self.enemies.retain(|id, _| incoming.contains_key(id));
        let destination = self.core().map_or_else(|| self.world_size() * 0.5, Structure::center);
        for (id, state) in incoming {
            self.enemies
                .entry(*id)
                .or_insert_with(|| Enemy::new(*id, Vec2::new(state.x, state.y), destination, state.max_hp))
                .apply_state(state);
        }
    }

    fn reconcile_projectiles(&mut self, incoming: &BTreeMap<ProjectileId, ProjectileState>) {
        self.projectiles.retain(|id, _| incoming.contains_key(id));
        for (id, state) in incoming {
            match self.projectiles.get_mut(id) {
                Some(p) => p.apply_state(state),
                None => {
                    self.projectiles.insert(*id, Projectile::from_state(state));
                }
            }
        }
    }

    /// Rebuild an authoritative world from a save.
    ///
    /// The host player is recreated near the core if the save has none.
    /// Fails if the snapshot holds no core.
    pub fn restore(mut config: WorldConfig, snapshot: &FullSnapshot, host: &PlayerProfile) -> Result<Self> {
        if let (Some(w), Some(h)) = (snapshot.grid_width, snapshot.grid_height) {
            config.grid_width = w;
            config.grid_height = h;
        }
        config.validate()?;
        let mut world = Self::new(config);
        world.apply_full_snapshot(snapshot);

        let Some(core) = world.core() else {
            return Err(GameError::InvalidState("save has no core".to_string()));
        };
        if world.player(PlayerId::HOST).is_none() {
            let spawn = world.clamp_spawn(core.center() - Vec2::new(0.0, 2.0 * TILE_SIZE));
            world.insert_player(Player::new(PlayerId::HOST, spawn, host));
        }

        // Ids are minted by incrementing first, so the counter must not trail any live id.
        if let Some(max) = world.enemies.keys().max().map(|id| id.0) {
            world.next_enemy_id = world.next_enemy_id.max(max);
        }
        if let Some(max) = world.projectiles.keys().max().map(|id| id.0) {
            world.next_projectile_id = world.next_projectile_id.max(max);
        }
        info!(
            wave = world.waves.number(),
            structures = world.structures.len(),
            "Restored world from snapshot"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::grid::Orientation;
    use crate::structures::StructureKind;

    fn sample_world() -> World {
        let mut world = World::generate(WorldConfig::default(), &PlayerProfile::default());
        world.insert_structure(Structure::new(StructureKind::Wall, GridPos::new(3, 3), Orientation::East));
        world.insert_structure(Structure::new(StructureKind::Conveyor, GridPos::new(4, 3), Orientation::South));
        world.spawn_enemy_at(Vec2::new(100.0, 40.0), 50.0);
        world.discard_outbox();
        world
    }

    #[test]
    fn test_snapshot_json_shape() {
        let snapshot = sample_world().full_snapshot();
        let value = serde_json::to_value(&snapshot).unwrap();
        assert!(value["players"]["0"].is_object());
        assert!(value["enemies"]["1"].is_object());
        assert_eq!(value["core_hp"], json!(CORE_HP));
        assert!(value.get("game_mode_for_save").is_none());
        let key = value["base_terrain"].as_object().unwrap().keys().next().unwrap().clone();
        assert!(key.parse::<GridPos>().is_ok());
    }

    #[test]
    fn test_apply_to_empty_world_matches_source() {
        let source = sample_world();
        let snapshot = source.full_snapshot();
        let mut replica = World::new(WorldConfig::default());
        replica.apply_full_snapshot(&snapshot);
        assert_eq!(replica.full_snapshot(), snapshot);
        assert!(replica.core().is_some());
        assert_eq!(
            replica.get_at(GridPos::new(4, 3)).map(Structure::kind),
            Some(StructureKind::Conveyor)
        );
    }

    #[test]
    fn test_apply_removes_missing_entities() {
        let source = World::generate(WorldConfig::default(), &PlayerProfile::default());
        let mut replica = sample_world();
        replica.apply_full_snapshot(&source.full_snapshot());
        assert!(replica.get_at(GridPos::new(3, 3)).is_none());
        assert_eq!(replica.enemies().count(), 0);
    }

    #[test]
    fn test_lenient_decode_skips_bad_entity() {
        let mut value = serde_json::to_value(sample_world().full_snapshot()).unwrap();
        value["structures"]["bogus"] = json!({"type": "drill", "gx": "nope"});
        value["base_terrain"]["9,9"] = json!("unobtainium");
        let snapshot = FullSnapshot::from_value(value).unwrap();
        assert_eq!(snapshot.structures.len(), sample_world().structures().count());
        assert!(!snapshot.base_terrain.contains_key("9,9"));
    }

    #[test]
    fn test_missing_scalars_rejected() {
        assert!(FullSnapshot::from_value(json!({"players": {}})).is_err());
    }

    #[test]
    fn test_restore_requires_core() {
        let mut snapshot = sample_world().full_snapshot();
        snapshot.structures.retain(|_, s| s.detail.kind() != StructureKind::Core);
        let err = World::restore(WorldConfig::default(), &snapshot, &PlayerProfile::default());
        assert!(err.is_err());
    }

    #[test]
    fn test_restore_recreates_host() {
        let mut snapshot = sample_world().full_snapshot();
        snapshot.players.clear();
        let world = World::restore(WorldConfig::default(), &snapshot, &PlayerProfile::default()).unwrap();
        assert!(world.player(PlayerId::HOST).is_some());
    }
}
