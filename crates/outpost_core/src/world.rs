//! The world: tile grid, entity registries and the validated player actions.
//!
//! # Ownership
//!
//! The world exclusively owns every structure, enemy, projectile and player.
//! Entities refer to each other only by id or tile coordinates and resolve
//! those through the lookups here on every use, so a reference to something
//! destroyed simply resolves to `None`.
//!
//! # Actions
//!
//! [`World::place_structure`], [`World::remove_structure`] and
//! [`World::upgrade_structure`] validate first and mutate only on success.
//! A rejection returns `false` and leaves the world untouched. Successful
//! actions queue the matching incremental messages (see
//! [`crate::protocol::ServerMessage`]) for the session to broadcast.
//!
//! # Determinism
//!
//! Registries are `BTreeMap`s so iteration is in id order, and all randomness
//! comes from a `ChaCha8Rng` seeded from [`WorldConfig::seed`].

use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};

use crate::config::WorldConfig;
use crate::enemy::{Enemy, EnemyId, ENEMY_KILL_REWARD};
use crate::error::ActionRejected;
use crate::grid::{Grid, GridPos, Orientation};
use crate::math::{tile_span, Vec2, TILE_SIZE};
use crate::player::{Player, PlayerId, PlayerProfile};
use crate::projectile::{Projectile, ProjectileId};
use crate::protocol::ServerMessage;
use crate::resources::{ResourceKind, ResourceMap};
use crate::structures::stats::REFUND_RATIO;
use crate::structures::{Structure, StructureId, StructureKind, Variant};
use crate::waves::WaveDirector;

/// Enemies spawn this far outside the map edge.
pub const SPAWN_MARGIN: f32 = 1.5 * TILE_SIZE;

/// Patches per tile on the reference 40x19 map.
const PATCH_DENSITY: f32 = 65.0 / (40.0 * 19.0);
/// Every n-th patch is coal.
const COAL_EVERY: u32 = 4;
/// Patches stay this far from the core.
const PATCH_CORE_CLEARANCE: f32 = 6.0 * TILE_SIZE;
/// Placement attempts per wanted patch.
const PATCH_ATTEMPTS: u32 = 150;

/// Whether the game is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GameStatus {
    /// Playing.
    #[default]
    Running,
    /// Core destroyed. Latched.
    Over,
    /// All waves survived. Latched.
    Won,
}

/// What occupies a tile, as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Occupant<'a> {
    /// Nothing.
    Empty,
    /// Bare resource patch.
    Patch(ResourceKind),
    /// A structure (possibly sitting on a patch).
    Structure(&'a Structure),
}

/// The authoritative (or replicated) game world.
#[derive(Debug, Clone)]
pub struct World {
    pub(crate) config: WorldConfig,
    pub(crate) grid: Grid,
    pub(crate) terrain: BTreeMap<GridPos, ResourceKind>,
    pub(crate) structures: BTreeMap<StructureId, Structure>,
    pub(crate) core: Option<StructureId>,
    pub(crate) enemies: BTreeMap<EnemyId, Enemy>,
    pub(crate) projectiles: BTreeMap<ProjectileId, Projectile>,
    pub(crate) players: BTreeMap<PlayerId, Player>,
    pub(crate) resources: ResourceMap,
    pub(crate) waves: WaveDirector,
    pub(crate) status: GameStatus,
    pub(crate) power_nodes: BTreeSet<StructureId>,
    pub(crate) power_consumers: BTreeSet<StructureId>,
    pub(crate) next_enemy_id: u32,
    pub(crate) next_projectile_id: u32,
    pub(crate) next_player_id: u32,
    pub(crate) rng: ChaCha8Rng,
    outbox: Vec<ServerMessage>,
}

impl World {
    /// Empty world: no core, no players, no terrain, starting resources.
    ///
    /// # Panics
    ///
    /// Panics if the configured grid is empty; see [`WorldConfig::validate`].
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        let grid = Grid::new(config.grid_width, config.grid_height);
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let waves = WaveDirector::new(config.max_waves);
        Self {
            config,
            grid,
            terrain: BTreeMap::new(),
            structures: BTreeMap::new(),
            core: None,
            enemies: BTreeMap::new(),
            projectiles: BTreeMap::new(),
            players: BTreeMap::new(),
            resources: ResourceMap::starting(),
            waves,
            status: GameStatus::Running,
            power_nodes: BTreeSet::new(),
            power_consumers: BTreeSet::new(),
            next_enemy_id: 0,
            next_projectile_id: 0,
            next_player_id: 1,
            rng,
            outbox: Vec::new(),
        }
    }

    /// Fresh playable world: core near the bottom middle, the host player
    /// just above it, and scattered resource patches.
    #[must_use]
    pub fn generate(config: WorldConfig, host: &PlayerProfile) -> Self {
        let mut world = Self::new(config);
        let w = world.grid.width() as i32;
        let h = world.grid.height() as i32;

        let core_pos = GridPos::new((w / 2).clamp(0, w - 1), (h - 4).clamp(0, h - 1));
        world.insert_structure(Structure::new(
            StructureKind::Core,
            core_pos,
            Orientation::default(),
        ));

        let spawn = world.clamp_spawn(core_pos.offset(0, -2).center());
        world
            .players
            .insert(PlayerId::HOST, Player::new(PlayerId::HOST, spawn, host));

        world.scatter_patches(core_pos);
        info!(
            width = w,
            height = h,
            patches = world.terrain.len(),
            seed = world.config.seed,
            "Generated new world"
        );
        world
    }

    fn scatter_patches(&mut self, core_pos: GridPos) {
        let (w, h) = (self.grid.width() as i32, self.grid.height() as i32);
        if w < 3 || h < 3 {
            return;
        }
        let wanted = (PATCH_DENSITY * (w * h) as f32) as u32;
        let core_center = core_pos.center();
        let clearance_sq = PATCH_CORE_CLEARANCE * PATCH_CORE_CLEARANCE;

        let mut placed = 0;
        let mut attempts = 0;
        while placed < wanted && attempts < wanted * PATCH_ATTEMPTS {
            attempts += 1;
            let kind = if (placed + 1) % COAL_EVERY == 0 {
                ResourceKind::Coal
            } else {
                ResourceKind::Copper
            };
            let pos = GridPos::new(self.rng.gen_range(1..=w - 2), self.rng.gen_range(1..=h - 2));

            let free = self.grid.get(pos).is_none() && !self.terrain.contains_key(&pos);
            let far = pos.center().distance_squared(core_center) > clearance_sq;
            let lonely = self
                .grid
                .square_around(pos, 1)
                .all(|p| !self.terrain.contains_key(&p));
            if free && far && lonely {
                self.terrain.insert(pos, kind);
                placed += 1;
            }
        }
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Configuration the world was created with.
    #[must_use]
    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    /// Occupancy grid.
    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Map extent in world units.
    #[must_use]
    pub fn world_size(&self) -> Vec2 {
        self.grid.world_size()
    }

    /// Patch kind under `pos`, if any.
    #[must_use]
    pub fn terrain_at(&self, pos: GridPos) -> Option<ResourceKind> {
        self.terrain.get(&pos).copied()
    }

    /// Mark `pos` as a resource patch. Out-of-bounds positions are ignored.
    pub fn set_terrain(&mut self, pos: GridPos, kind: ResourceKind) {
        if self.grid.in_bounds(pos) {
            self.terrain.insert(pos, kind);
        }
    }

    /// All resource patches.
    pub fn terrain(&self) -> impl Iterator<Item = (GridPos, ResourceKind)> + '_ {
        self.terrain.iter().map(|(&p, &k)| (p, k))
    }

    /// Structure at `pos`; `None` for empty, patch-only or out-of-bounds tiles.
    #[must_use]
    pub fn get_at(&self, pos: GridPos) -> Option<&Structure> {
        self.grid.get(pos).and_then(|id| self.structures.get(id))
    }

    /// Full view of a tile, including bare patches.
    #[must_use]
    pub fn occupant(&self, pos: GridPos) -> Occupant<'_> {
        match (self.get_at(pos), self.terrain_at(pos)) {
            (Some(s), _) => Occupant::Structure(s),
            (None, Some(kind)) => Occupant::Patch(kind),
            (None, None) => Occupant::Empty,
        }
    }

    /// Structure by id.
    #[must_use]
    pub fn get_by_id(&self, id: &StructureId) -> Option<&Structure> {
        self.structures.get(id)
    }

    /// Mutable structure by id.
    pub fn structure_mut(&mut self, id: &StructureId) -> Option<&mut Structure> {
        self.structures.get_mut(id)
    }

    /// All structures in id order.
    pub fn structures(&self) -> impl Iterator<Item = &Structure> {
        self.structures.values()
    }

    /// The core, if standing.
    #[must_use]
    pub fn core(&self) -> Option<&Structure> {
        self.core.as_ref().and_then(|id| self.structures.get(id))
    }

    /// Enemy by id.
    #[must_use]
    pub fn enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    /// All enemies in id order.
    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values()
    }

    /// Projectile by id.
    #[must_use]
    pub fn projectile(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.get(&id)
    }

    /// All projectiles in id order.
    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// Player by id.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    /// All players in id order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    /// Shared resource pool.
    #[must_use]
    pub fn resources(&self) -> &ResourceMap {
        &self.resources
    }

    /// Mutable resource pool.
    pub fn resources_mut(&mut self) -> &mut ResourceMap {
        &mut self.resources
    }

    /// Wave director.
    #[must_use]
    pub fn waves(&self) -> &WaveDirector {
        &self.waves
    }

    /// Mutable wave director.
    pub fn waves_mut(&mut self) -> &mut WaveDirector {
        &mut self.waves
    }

    /// Game status.
    #[must_use]
    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub(crate) fn rng(&mut self) -> &mut ChaCha8Rng {
        &mut self.rng
    }

    /// Nearest live enemy within `range_sq` of `center`. Ties keep the lowest id.
    #[must_use]
    pub fn nearest_enemy_within(&self, center: Vec2, range_sq: f32) -> Option<(EnemyId, Vec2)> {
        let mut best: Option<(f32, EnemyId, Vec2)> = None;
        for e in self.enemies.values().filter(|e| !e.destroyed) {
            let d = e.pos.distance_squared(center);
            if d <= range_sq && best.map_or(true, |(bd, _, _)| d < bd) {
                best = Some((d, e.id, e.pos));
            }
        }
        best.map(|(_, id, pos)| (id, pos))
    }

    /// Ids of live structures below max hp whose center is within `radius`.
    #[must_use]
    pub fn damaged_structures_within(&self, center: Vec2, radius: f32) -> Vec<StructureId> {
        let radius_sq = radius * radius;
        let mut found: Vec<StructureId> = self
            .grid
            .square_around(GridPos::from_world(center), tile_span(radius, 2))
            .filter_map(|p| self.get_at(p))
            .filter(|s| {
                !s.destroyed && s.hp < s.max_hp && s.center().distance_squared(center) <= radius_sq
            })
            .map(|s| s.id.clone())
            .collect();
        found.sort();
        found
    }

    // =========================================================================
    // Registry maintenance
    // =========================================================================

    /// Insert a structure without any cost or proximity checks.
    ///
    /// Fails if the tile is out of bounds, already occupied, or the id is taken.
    pub fn insert_structure(&mut self, structure: Structure) -> bool {
        if !self.grid.in_bounds(structure.pos) {
            warn!(id = %structure.id, "Structure outside grid, not inserted");
            return false;
        }
        if self.grid.get(structure.pos).is_some() || self.structures.contains_key(&structure.id) {
            warn!(id = %structure.id, "Tile or id already taken, not inserted");
            return false;
        }
        if structure.kind() == StructureKind::Core {
            if let Some(old) = self.core.clone() {
                warn!(old = %old, new = %structure.id, "Replacing existing core");
                self.remove_structure_by_id(&old);
            }
            self.core = Some(structure.id.clone());
        }
        self.grid.set(structure.pos, structure.id.clone());
        let id = structure.id.clone();
        self.structures.insert(id.clone(), structure);
        self.refresh_power_roles(&id);
        true
    }

    /// Remove a structure by id, clearing its tile. Terrain under it stays.
    pub fn remove_structure_by_id(&mut self, id: &StructureId) -> Option<Structure> {
        let structure = self.structures.remove(id)?;
        self.grid.clear_if(structure.pos, id);
        self.power_nodes.remove(id);
        self.power_consumers.remove(id);
        if self.core.as_ref() == Some(id) {
            self.core = None;
        }
        Some(structure)
    }

    /// Re-derive power list membership for one structure.
    pub(crate) fn refresh_power_roles(&mut self, id: &StructureId) {
        self.power_nodes.remove(id);
        self.power_consumers.remove(id);
        if let Some(s) = self.structures.get(id) {
            if s.is_power_node() {
                self.power_nodes.insert(id.clone());
            }
            if s.is_power_consumer() {
                self.power_consumers.insert(id.clone());
            }
        }
    }

    /// Rebuild both power lists from the registry.
    pub fn rebuild_power_lists(&mut self) {
        self.power_nodes = self
            .structures
            .values()
            .filter(|s| s.is_power_node())
            .map(|s| s.id.clone())
            .collect();
        self.power_consumers = self
            .structures
            .values()
            .filter(|s| s.is_power_consumer())
            .map(|s| s.id.clone())
            .collect();
        debug!(
            nodes = self.power_nodes.len(),
            consumers = self.power_consumers.len(),
            "Rebuilt power lists"
        );
    }

    /// Add a player under a fresh id, spawned `1 + id` rows above the core.
    pub fn join_player(&mut self, profile: &PlayerProfile) -> PlayerId {
        let id = PlayerId(self.next_player_id);
        self.next_player_id += 1;
        let anchor = self
            .core()
            .map_or_else(|| GridPos::new(0, 0), |c| c.pos)
            .offset(0, -(1 + id.0 as i32));
        let spawn = self.clamp_spawn(anchor.center());
        self.players.insert(id, Player::new(id, spawn, profile));
        info!(player = %id, name = %profile.name, "Player joined");
        id
    }

    /// Insert a player with a known id, e.g. the host after a load.
    pub fn insert_player(&mut self, player: Player) {
        self.next_player_id = self.next_player_id.max(player.id.0 + 1);
        self.players.insert(player.id, player);
    }

    /// Remove a player. Returns whether it existed.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let removed = self.players.remove(&id).is_some();
        if removed {
            info!(player = %id, "Player left");
        }
        removed
    }

    /// Spawn point for a player near `center`, kept a tile away from the edges.
    pub(crate) fn clamp_spawn(&self, center: Vec2) -> Vec2 {
        let size = self.world_size();
        let min = Vec2::new(TILE_SIZE, TILE_SIZE);
        let max = Vec2::new((size.x - TILE_SIZE).max(TILE_SIZE), (size.y - TILE_SIZE).max(TILE_SIZE));
        center.clamp(min, max)
    }

    // =========================================================================
    // Interactions used by entity updates
    // =========================================================================

    /// Hand one item to the structure at `pos`. Returns true if it was taken.
    pub fn deliver_item(&mut self, pos: GridPos, item: ResourceKind) -> bool {
        let Some(id) = self.grid.get(pos) else {
            return false;
        };
        let Some(structure) = self.structures.get_mut(id) else {
            return false;
        };
        let accepted = structure.accept_item(item, &mut self.resources);
        if accepted && structure.kind() == StructureKind::Core {
            self.emit(ServerMessage::ResourceUpdate {
                data: self.resources.clone(),
            });
        }
        accepted
    }

    /// Damage a structure. Returns true if it was destroyed by this hit.
    ///
    /// Once the game is over, further damage to the core is ignored.
    pub fn damage_structure(&mut self, id: &StructureId, amount: f32) -> bool {
        let game_over = self.status == GameStatus::Over;
        let Some(s) = self.structures.get_mut(id) else {
            return false;
        };
        if s.kind() == StructureKind::Core && game_over {
            return false;
        }
        let destroyed = s.take_damage(amount);
        if destroyed {
            debug!(id = %id, kind = ?s.kind(), "Structure destroyed");
        }
        destroyed
    }

    /// Damage an enemy. A kill credits the kill reward. Returns true on kill.
    pub fn damage_enemy(&mut self, id: EnemyId, amount: f32) -> bool {
        let Some(enemy) = self.enemies.get_mut(&id) else {
            return false;
        };
        let killed = enemy.take_damage(amount);
        if killed {
            self.resources.add(ResourceKind::Copper, ENEMY_KILL_REWARD);
            self.emit(ServerMessage::ResourceUpdate {
                data: self.resources.clone(),
            });
        }
        killed
    }

    /// Spawn an enemy at `pos` heading for the core.
    pub fn spawn_enemy_at(&mut self, pos: Vec2, hp: f32) -> EnemyId {
        self.next_enemy_id += 1;
        let id = EnemyId(self.next_enemy_id);
        let destination = self.core().map_or_else(|| self.world_size() * 0.5, Structure::center);
        let enemy = Enemy::new(id, pos, destination, hp);
        self.emit(ServerMessage::EnemyAdd { data: enemy.state() });
        self.enemies.insert(id, enemy);
        id
    }

    /// Spawn a wave enemy just outside a random top, left or right edge.
    pub(crate) fn spawn_wave_enemy(&mut self) -> Option<EnemyId> {
        if self.core.is_none() {
            warn!("No core, skipping enemy spawn");
            return None;
        }
        let size = self.world_size();
        let m = SPAWN_MARGIN;
        let along = |rng: &mut ChaCha8Rng, extent: f32| {
            if extent > 2.0 * m {
                rng.gen_range(m..extent - m)
            } else {
                extent / 2.0
            }
        };
        let pos = match self.rng.gen_range(0..3) {
            0 => Vec2::new(along(&mut self.rng, size.x), -m),
            1 => Vec2::new(-m, along(&mut self.rng, size.y)),
            _ => Vec2::new(size.x + m, along(&mut self.rng, size.y)),
        };
        let hp = self.waves.enemy_hp();
        Some(self.spawn_enemy_at(pos, hp))
    }

    /// Fire a projectile from `origin` at an enemy.
    pub fn spawn_projectile(
        &mut self,
        origin: Vec2,
        target: EnemyId,
        target_pos: Vec2,
        damage: f32,
    ) -> ProjectileId {
        self.next_projectile_id += 1;
        let id = ProjectileId(self.next_projectile_id);
        let projectile = Projectile::aimed(id, origin, target, target_pos, damage);
        self.emit(ServerMessage::ProjectileAdd {
            data: projectile.state(),
        });
        self.projectiles.insert(id, projectile);
        id
    }

    // =========================================================================
    // Player actions
    // =========================================================================

    /// Place a structure for `player`. Returns false and changes nothing on rejection.
    pub fn place_structure(
        &mut self,
        player: PlayerId,
        kind: StructureKind,
        pos: GridPos,
        orientation: Orientation,
    ) -> bool {
        match self.try_place(player, kind, pos, orientation) {
            Ok(id) => {
                debug!(player = %player, id = %id, "Placed structure");
                true
            }
            Err(reason) => {
                debug!(player = %player, ?kind, %pos, %reason, "Placement rejected");
                false
            }
        }
    }

    fn check_reach(&self, player: PlayerId, pos: GridPos) -> Result<(), ActionRejected> {
        let p = self.players.get(&player).ok_or(ActionRejected::UnknownPlayer)?;
        if !p.can_reach(pos.center()) {
            return Err(ActionRejected::OutOfBuildRange);
        }
        Ok(())
    }

    fn try_place(
        &mut self,
        player: PlayerId,
        kind: StructureKind,
        pos: GridPos,
        orientation: Orientation,
    ) -> Result<StructureId, ActionRejected> {
        if !self.players.contains_key(&player) {
            return Err(ActionRejected::UnknownPlayer);
        }
        if !kind.is_buildable() {
            return Err(ActionRejected::NotBuildable);
        }
        if !self.grid.in_bounds(pos) {
            return Err(ActionRejected::OutOfBounds);
        }
        let cost = kind.build_cost();
        if !self.resources.covers(cost) {
            return Err(ActionRejected::InsufficientResources);
        }
        self.check_reach(player, pos)?;

        let legal = match (kind, self.occupant(pos)) {
            (StructureKind::Drill, Occupant::Patch(_)) => true,
            (StructureKind::Drill, _) => false,
            (_, occupant) => occupant == Occupant::Empty,
        };
        if !legal {
            return Err(ActionRejected::IllegalTile);
        }

        if !self.resources.try_spend(cost) {
            return Err(ActionRejected::InsufficientResources);
        }
        let mut structure = Structure::new(kind, pos, orientation);
        let tier = structure.tier;
        match &mut structure.variant {
            Variant::Drill(d) => d.resource = self.terrain_at(pos),
            Variant::Turret(t) => t.randomize_phase(tier, &mut self.rng),
            _ => {}
        }
        let id = structure.id.clone();
        let state = structure.state();
        if !self.insert_structure(structure) {
            self.resources.refund(cost);
            return Err(ActionRejected::IllegalTile);
        }

        self.emit(ServerMessage::StructureAdd { data: state });
        self.emit(ServerMessage::ResourceUpdate {
            data: self.resources.clone(),
        });
        Ok(id)
    }

    /// Remove the structure at `pos` for `player`, refunding half its build cost.
    pub fn remove_structure(&mut self, player: PlayerId, pos: GridPos) -> bool {
        match self.try_remove(player, pos) {
            Ok(id) => {
                debug!(player = %player, id = %id, "Removed structure");
                true
            }
            Err(reason) => {
                debug!(player = %player, %pos, %reason, "Removal rejected");
                false
            }
        }
    }

    fn try_remove(&mut self, player: PlayerId, pos: GridPos) -> Result<StructureId, ActionRejected> {
        if !self.players.contains_key(&player) {
            return Err(ActionRejected::UnknownPlayer);
        }
        let target = self.get_at(pos).ok_or(ActionRejected::NothingThere)?;
        if target.kind() == StructureKind::Core {
            return Err(ActionRejected::NotRemovable);
        }
        let (id, kind) = (target.id.clone(), target.kind());
        self.check_reach(player, pos)?;

        self.resources.refund_fraction(kind.build_cost(), REFUND_RATIO);
        self.remove_structure_by_id(&id);
        self.emit(ServerMessage::StructureRemove { net_id: id.clone() });
        self.emit(ServerMessage::ResourceUpdate {
            data: self.resources.clone(),
        });
        Ok(id)
    }

    /// Upgrade the structure at `pos` by one tier for `player`.
    pub fn upgrade_structure(&mut self, player: PlayerId, pos: GridPos) -> bool {
        match self.try_upgrade(player, pos) {
            Ok(id) => {
                debug!(player = %player, id = %id, "Upgraded structure");
                true
            }
            Err(reason) => {
                debug!(player = %player, %pos, %reason, "Upgrade rejected");
                false
            }
        }
    }

    fn try_upgrade(&mut self, player: PlayerId, pos: GridPos) -> Result<StructureId, ActionRejected> {
        if !self.players.contains_key(&player) {
            return Err(ActionRejected::UnknownPlayer);
        }
        self.check_reach(player, pos)?;
        let target = self.get_at(pos).ok_or(ActionRejected::NothingThere)?;
        let cost = target.next_upgrade_cost().ok_or(ActionRejected::CannotUpgrade)?;
        let id = target.id.clone();
        if !self.resources.try_spend(cost) {
            return Err(ActionRejected::InsufficientResources);
        }

        let Some(structure) = self.structures.get_mut(&id) else {
            self.resources.refund(cost);
            return Err(ActionRejected::NothingThere);
        };
        structure.apply_upgrade();
        let state = structure.state();
        self.refresh_power_roles(&id);

        self.emit(ServerMessage::StructureUpdate { data: state });
        self.emit(ServerMessage::ResourceUpdate {
            data: self.resources.clone(),
        });
        Ok(id)
    }

    // =========================================================================
    // Outbound messages
    // =========================================================================

    pub(crate) fn emit(&mut self, message: ServerMessage) {
        self.outbox.push(message);
    }

    /// Take all queued incremental messages, oldest first.
    pub fn drain_outbox(&mut self) -> Vec<ServerMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Drop queued messages (replicas never broadcast).
    pub(crate) fn discard_outbox(&mut self) {
        self.outbox.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world_with_player() -> World {
        let mut world = World::new(WorldConfig::default());
        world.insert_player(Player::new(
            PlayerId::HOST,
            GridPos::new(10, 10).center(),
            &PlayerProfile::default(),
        ));
        world
    }

    #[test]
    fn test_wave_enemies_never_enter_from_bottom() {
        let mut world = World::generate(WorldConfig::default(), &PlayerProfile::default());
        let size = world.world_size();
        let (mut top, mut left, mut right) = (0, 0, 0);
        for _ in 0..300 {
            let id = world.spawn_wave_enemy().expect("core exists");
            let pos = world.enemy(id).map(|e| e.pos).expect("spawned");
            assert!(pos.y < size.y, "spawned below the map at {pos:?}");
            if pos.y < 0.0 {
                top += 1;
            } else if pos.x < 0.0 {
                left += 1;
            } else {
                assert!(pos.x > size.x, "spawned inside the map at {pos:?}");
                right += 1;
            }
        }
        assert!(top > 0 && left > 0 && right > 0);
    }

    #[test]
    fn test_generate_places_core_player_and_patches() {
        let world = World::generate(WorldConfig::default(), &PlayerProfile::default());
        let core = world.core().expect("core");
        assert_eq!(core.pos, GridPos::new(20, 15));
        assert_eq!(world.player(PlayerId::HOST).map(|p| p.pos), Some(GridPos::new(20, 13).center()));
        assert!(world.terrain().count() > 30);
        for (pos, _) in world.terrain() {
            assert!(pos.center().distance_squared(core.center()) > PATCH_CORE_CLEARANCE.powi(2));
            assert!(world.get_at(pos).is_none());
        }
    }

    #[test]
    fn test_generate_is_seed_deterministic() {
        let a = World::generate(WorldConfig::default(), &PlayerProfile::default());
        let b = World::generate(WorldConfig::default(), &PlayerProfile::default());
        assert_eq!(a.terrain, b.terrain);
    }

    #[test]
    fn test_place_deducts_cost_and_queues_messages() {
        let mut world = world_with_player();
        let pos = GridPos::new(11, 10);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Wall, pos, Orientation::East));
        assert_eq!(world.resources().get(ResourceKind::Copper), 190);
        assert_eq!(world.get_at(pos).map(Structure::kind), Some(StructureKind::Wall));

        let messages = world.drain_outbox();
        assert!(matches!(messages[0], ServerMessage::StructureAdd { .. }));
        assert!(matches!(messages[1], ServerMessage::ResourceUpdate { .. }));
    }

    #[test]
    fn test_place_rejections_leave_world_untouched() {
        let mut world = world_with_player();
        let occupied = GridPos::new(11, 10);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Wall, occupied, Orientation::East));
        world.drain_outbox();
        let before = world.resources().clone();

        // occupied
        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Wall, occupied, Orientation::East));
        // out of reach
        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Wall, GridPos::new(30, 10), Orientation::East));
        // out of bounds
        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Wall, GridPos::new(-1, 10), Orientation::East));
        // core is not buildable
        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Core, GridPos::new(12, 10), Orientation::East));
        // unknown player
        assert!(!world.place_structure(PlayerId(9), StructureKind::Wall, GridPos::new(12, 10), Orientation::East));
        // drill off-patch
        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Drill, GridPos::new(12, 10), Orientation::East));

        assert_eq!(world.resources(), &before);
        assert!(world.drain_outbox().is_empty());
    }

    #[test]
    fn test_drill_needs_patch_and_binds_kind() {
        let mut world = world_with_player();
        let patch = GridPos::new(9, 9);
        world.set_terrain(patch, ResourceKind::Coal);

        assert!(!world.place_structure(PlayerId::HOST, StructureKind::Wall, patch, Orientation::East));
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Drill, patch, Orientation::East));
        match &world.get_at(patch).map(|s| &s.variant) {
            Some(Variant::Drill(d)) => assert_eq!(d.resource, Some(ResourceKind::Coal)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_remove_refunds_half_and_keeps_patch() {
        let mut world = world_with_player();
        let patch = GridPos::new(9, 9);
        world.set_terrain(patch, ResourceKind::Copper);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Drill, patch, Orientation::East));
        assert_eq!(world.resources().get(ResourceKind::Copper), 185);

        assert!(world.remove_structure(PlayerId::HOST, patch));
        assert_eq!(world.resources().get(ResourceKind::Copper), 192);
        assert_eq!(world.occupant(patch), Occupant::Patch(ResourceKind::Copper));
        assert!(!world.remove_structure(PlayerId::HOST, patch));
    }

    #[test]
    fn test_core_cannot_be_removed() {
        let mut world = world_with_player();
        let core_pos = GridPos::new(10, 12);
        assert!(world.insert_structure(Structure::new(StructureKind::Core, core_pos, Orientation::East)));
        assert!(!world.remove_structure(PlayerId::HOST, core_pos));
        assert!(world.core().is_some());
    }

    #[test]
    fn test_upgrade_to_consumer_updates_power_lists() {
        let mut world = world_with_player();
        world.resources_mut().add(ResourceKind::Copper, 1000);
        world.resources_mut().add(ResourceKind::Coal, 1000);
        let pos = GridPos::new(11, 11);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Turret, pos, Orientation::East));
        let id = world.get_at(pos).map(|s| s.id.clone()).unwrap();

        assert!(world.upgrade_structure(PlayerId::HOST, pos));
        assert!(!world.power_consumers.contains(&id));
        assert!(world.upgrade_structure(PlayerId::HOST, pos));
        assert!(world.power_consumers.contains(&id));
        assert!(!world.upgrade_structure(PlayerId::HOST, pos));
    }

    #[test]
    fn test_upgrade_unaffordable_is_rejected() {
        let mut world = world_with_player();
        let pos = GridPos::new(11, 11);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Turret, pos, Orientation::East));
        world.resources_mut().set(ResourceKind::Coal, 0);
        let before = world.resources().clone();
        assert!(!world.upgrade_structure(PlayerId::HOST, pos));
        assert_eq!(world.resources(), &before);
        assert_eq!(world.get_at(pos).map(|s| s.tier), Some(1));
    }

    #[test]
    fn test_core_damage_ignored_after_game_over() {
        let mut world = world_with_player();
        let core = Structure::new(StructureKind::Core, GridPos::new(10, 12), Orientation::East);
        let id = core.id.clone();
        world.insert_structure(core);
        world.status = GameStatus::Over;
        assert!(!world.damage_structure(&id, 5000.0));
        assert_eq!(world.core().map(|c| c.hp), Some(1500.0));
    }

    #[test]
    fn test_kill_reward() {
        let mut world = world_with_player();
        let id = world.spawn_enemy_at(Vec2::new(50.0, 50.0), 10.0);
        assert!(world.damage_enemy(id, 20.0));
        assert_eq!(world.resources().get(ResourceKind::Copper), 210);
        assert!(!world.damage_enemy(id, 20.0));
        assert_eq!(world.resources().get(ResourceKind::Copper), 210);
    }

    #[test]
    fn test_join_player_spawns_above_core() {
        let mut world = World::generate(WorldConfig::default(), &PlayerProfile::default());
        let id = world.join_player(&PlayerProfile {
            name: "Guest".into(),
            color_index: 3,
        });
        assert_eq!(id, PlayerId(1));
        let player = world.player(id).unwrap();
        assert_eq!(player.pos, GridPos::new(20, 13).center());
        assert_eq!(world.join_player(&PlayerProfile::default()), PlayerId(2));
    }
}
