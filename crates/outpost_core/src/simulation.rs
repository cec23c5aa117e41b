//! Simulation loop.
//!
//! One [`Simulation`] drives one [`World`], either as the authoritative side
//! (single player, host or dedicated server) or as a replica on a client.
//!
//! # Tick order (authoritative)
//!
//! 1. Players move along their intents.
//! 2. Structures update in id order.
//! 3. Enemies update.
//! 4. Projectiles update.
//! 5. Power engine, every [`POWER_INTERVAL`] seconds.
//! 6. Cleanup of destroyed entities; a destroyed core ends the game.
//! 7. Wave director, only while the game is running.
//! 8. Win check.
//!
//! Each registry entry is taken out of the world while it updates and put
//! back afterwards, so an entity never observes itself through the world.
//!
//! A replica only interpolates: conveyor items, projectiles and the local
//! player's own movement. Everything else arrives through
//! [`Simulation::apply_message`](crate::simulation::Simulation::apply_message).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tracing::{debug, info, warn};

use crate::enemy::EnemyId;
use crate::grid::GridPos;
use crate::math::Vec2;
use crate::player::PlayerId;
use crate::power::{PowerReport, POWER_INTERVAL};
use crate::projectile::ProjectileId;
use crate::protocol::{Intent, ServerMessage, TerminalStatus};
use crate::structures::{StructureId, StructureKind};
use crate::waves::WaveEnd;
use crate::world::{GameStatus, World};

/// Fixed simulation rate of the authoritative loop.
pub const TICK_RATE: u32 = 60;

/// Which side of the protocol this simulation is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the canonical world and runs all game logic.
    Authoritative,
    /// Mirrors a remote authoritative world.
    Replica,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Tick number after this tick.
    pub tick: u64,
    /// Outgoing messages, in the order they were produced. Includes messages
    /// queued by intents applied since the previous tick.
    pub messages: Vec<ServerMessage>,
    /// Result of the power engine, if it ran.
    pub power: Option<PowerReport>,
    /// A wave started this tick.
    pub wave_started: bool,
    /// A wave ended this tick.
    pub wave_ended: Option<WaveEnd>,
    /// The game reached a terminal state this tick.
    pub finished: Option<GameStatus>,
}

/// The world plus the loop that drives it.
#[derive(Debug, Clone)]
pub struct Simulation {
    world: World,
    role: Role,
    tick: u64,
    power_timer: f32,
    local_player: Option<PlayerId>,
}

impl Simulation {
    /// Authoritative simulation. `local_player` is the in-process player on a
    /// host or single-player game, `None` on a dedicated server.
    #[must_use]
    pub fn authoritative(world: World, local_player: Option<PlayerId>) -> Self {
        Self {
            world,
            role: Role::Authoritative,
            tick: 0,
            power_timer: 0.0,
            local_player,
        }
    }

    /// Replica of a remote world. The local player id arrives with `assign_id`.
    #[must_use]
    pub fn replica(world: World) -> Self {
        Self {
            world,
            role: Role::Replica,
            tick: 0,
            power_timer: 0.0,
            local_player: None,
        }
    }

    /// The simulated world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access for setup and tests.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Consume the simulation, returning its world.
    #[must_use]
    pub fn into_world(self) -> World {
        self.world
    }

    /// Which side this is.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Whether this simulation owns the canonical world.
    #[must_use]
    pub const fn is_authoritative(&self) -> bool {
        matches!(self.role, Role::Authoritative)
    }

    /// Ticks run so far.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// The in-process player, if any.
    #[must_use]
    pub const fn local_player(&self) -> Option<PlayerId> {
        self.local_player
    }

    pub(crate) fn set_local_player(&mut self, id: PlayerId) {
        self.local_player = Some(id);
    }

    /// Advance by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> TickEvents {
        self.tick += 1;
        let mut events = match self.role {
            Role::Authoritative => self.tick_authoritative(dt),
            Role::Replica => {
                self.tick_replica(dt);
                TickEvents::default()
            }
        };
        events.tick = self.tick;
        events.messages = self.world.drain_outbox();
        events
    }

    fn tick_authoritative(&mut self, dt: f32) -> TickEvents {
        let mut events = TickEvents::default();

        self.update_players(dt);
        self.update_structures(dt);
        self.update_enemies(dt);
        self.update_projectiles(dt);

        self.power_timer += dt;
        if self.power_timer >= POWER_INTERVAL {
            let elapsed = std::mem::take(&mut self.power_timer);
            events.power = Some(self.world.distribute_power(elapsed));
        }

        let core_destroyed = self.cleanup();
        if core_destroyed && self.world.status == GameStatus::Running {
            self.finish(GameStatus::Over);
            events.finished = Some(GameStatus::Over);
        }

        if self.world.status == GameStatus::Running {
            self.run_waves(dt, &mut events);
            if self.world.waves.all_waves_cleared(self.world.enemies.len()) {
                self.finish(GameStatus::Won);
                events.finished = Some(GameStatus::Won);
            }
        }
        events
    }

    fn update_players(&mut self, dt: f32) {
        let size = self.world.world_size();
        for player in self.world.players.values_mut() {
            player.update(dt, size);
        }
    }

    fn update_structures(&mut self, dt: f32) {
        let ids: Vec<StructureId> = self.world.structures.keys().cloned().collect();
        for id in ids {
            if let Some(mut structure) = self.world.structures.remove(&id) {
                structure.update(&mut self.world, dt);
                self.world.structures.insert(id, structure);
            }
        }
    }

    fn update_enemies(&mut self, dt: f32) {
        let ids: Vec<EnemyId> = self.world.enemies.keys().copied().collect();
        for id in ids {
            if let Some(mut enemy) = self.world.enemies.remove(&id) {
                enemy.update(&mut self.world, dt);
                self.world.enemies.insert(id, enemy);
            }
        }
    }

    fn update_projectiles(&mut self, dt: f32) {
        let ids: Vec<ProjectileId> = self.world.projectiles.keys().copied().collect();
        for id in ids {
            if let Some(mut projectile) = self.world.projectiles.remove(&id) {
                projectile.update(&mut self.world, dt);
                self.world.projectiles.insert(id, projectile);
            }
        }
    }

    /// Drop destroyed entities and queue the batched removals. Returns whether
    /// the core was among them.
    fn cleanup(&mut self) -> bool {
        let world = &mut self.world;

        let dead: Vec<StructureId> = world
            .structures
            .values()
            .filter(|s| s.destroyed)
            .map(|s| s.id.clone())
            .collect();
        let mut core_destroyed = false;
        for id in &dead {
            if let Some(s) = world.remove_structure_by_id(id) {
                core_destroyed |= s.kind() == StructureKind::Core;
            }
        }

        let dead_enemies: Vec<EnemyId> = world
            .enemies
            .values()
            .filter(|e| e.destroyed)
            .map(|e| e.id)
            .collect();
        for id in &dead_enemies {
            world.enemies.remove(id);
        }

        let spent: Vec<ProjectileId> = world
            .projectiles
            .values()
            .filter(|p| p.destroyed)
            .map(|p| p.id)
            .collect();
        for id in &spent {
            world.projectiles.remove(id);
        }

        if !dead.is_empty() {
            debug!(count = dead.len(), "Structures destroyed");
            world.emit(ServerMessage::StructuresRemove { ids: dead });
        }
        if !dead_enemies.is_empty() {
            world.emit(ServerMessage::EnemiesRemove { ids: dead_enemies });
        }
        if !spent.is_empty() {
            world.emit(ServerMessage::ProjectilesRemove { ids: spent });
        }
        core_destroyed
    }

    fn run_waves(&mut self, dt: f32, events: &mut TickEvents) {
        let world = &mut self.world;
        let alive = world.enemies.len();
        let step = world.waves.advance(dt, alive, &mut world.rng);

        if step.started {
            info!(
                wave = world.waves.number(),
                of = world.waves.max_waves(),
                hp = world.waves.enemy_hp(),
                "Wave started"
            );
            events.wave_started = true;
            world.emit(ServerMessage::WaveUpdate {
                data: world.waves.state(),
            });
        }
        if step.spawn {
            world.spawn_wave_enemy();
        }
        if let Some(end) = step.ended {
            info!(wave = world.waves.number(), result = ?end, "Wave ended");
            events.wave_ended = Some(end);
            world.emit(ServerMessage::WaveUpdate {
                data: world.waves.state(),
            });
        }
    }

    /// Latch a terminal status. Losing also clears every enemy.
    fn finish(&mut self, status: GameStatus) {
        let world = &mut self.world;
        world.status = status;
        let terminal = match status {
            GameStatus::Over => {
                let ids: Vec<EnemyId> = world.enemies.keys().copied().collect();
                world.enemies.clear();
                if !ids.is_empty() {
                    world.emit(ServerMessage::EnemiesRemove { ids });
                }
                info!(wave = world.waves.number(), "Game over, core destroyed");
                TerminalStatus::Over
            }
            GameStatus::Won => {
                info!(waves = world.waves.max_waves(), "All waves survived");
                TerminalStatus::Won
            }
            GameStatus::Running => return,
        };
        world.emit(ServerMessage::GameStatus { status: terminal });
    }

    fn tick_replica(&mut self, dt: f32) {
        for structure in self.world.structures.values_mut() {
            structure.interpolate(dt);
        }
        for projectile in self.world.projectiles.values_mut() {
            projectile.interpolate(dt);
        }
        let size = self.world.world_size();
        if let Some(player) = self.local_player.and_then(|id| self.world.players.get_mut(&id)) {
            player.update(dt, size);
        }
    }

    /// Apply a player's intent.
    ///
    /// On the authoritative side this runs the validated world action and
    /// returns whether it succeeded. A replica only applies movement of its
    /// own player, optimistically; every other intent returns `false` and must
    /// be sent to the server instead.
    pub fn apply_intent(&mut self, player: PlayerId, intent: &Intent) -> bool {
        if let Intent::Move { x, y } = *intent {
            if !x.is_finite() || !y.is_finite() {
                warn!(%player, "Ignoring non-finite move intent");
                return false;
            }
            if !self.is_authoritative() && self.local_player != Some(player) {
                return false;
            }
            return match self.world.players.get_mut(&player) {
                Some(p) => {
                    p.move_intent = Vec2::new(x, y);
                    true
                }
                None => false,
            };
        }

        if !self.is_authoritative() {
            return false;
        }
        match *intent {
            Intent::Place { kind, gx, gy, orient } => {
                self.world.place_structure(player, kind, GridPos::new(gx, gy), orient)
            }
            Intent::Remove { gx, gy } => self.world.remove_structure(player, GridPos::new(gx, gy)),
            Intent::Upgrade { gx, gy } => self.world.upgrade_structure(player, GridPos::new(gx, gy)),
            Intent::Move { .. } => false,
        }
    }

    /// Hash of the synced world state.
    ///
    /// Two worlds with identical entities, resources and wave state hash the
    /// same. Transient timers are left out.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let world = &self.world;
        let mut hasher = DefaultHasher::new();

        world.status.hash(&mut hasher);
        world.resources.hash(&mut hasher);
        let wave = world.waves.state();
        wave.number.hash(&mut hasher);
        wave.timer.to_bits().hash(&mut hasher);
        wave.in_wave.hash(&mut hasher);

        world.terrain.len().hash(&mut hasher);
        for (pos, kind) in &world.terrain {
            pos.hash(&mut hasher);
            kind.hash(&mut hasher);
        }

        world.structures.len().hash(&mut hasher);
        for (id, s) in &world.structures {
            id.hash(&mut hasher);
            s.pos.hash(&mut hasher);
            s.hp.to_bits().hash(&mut hasher);
            s.tier.hash(&mut hasher);
            s.is_powered.hash(&mut hasher);
            s.is_on_grid.hash(&mut hasher);
        }

        world.enemies.len().hash(&mut hasher);
        for (id, e) in &world.enemies {
            id.hash(&mut hasher);
            e.pos.x.to_bits().hash(&mut hasher);
            e.pos.y.to_bits().hash(&mut hasher);
            e.hp.to_bits().hash(&mut hasher);
        }

        world.projectiles.len().hash(&mut hasher);
        for (id, p) in &world.projectiles {
            id.hash(&mut hasher);
            p.pos.x.to_bits().hash(&mut hasher);
            p.pos.y.to_bits().hash(&mut hasher);
        }

        world.players.len().hash(&mut hasher);
        for (id, p) in &world.players {
            id.hash(&mut hasher);
            p.pos.x.to_bits().hash(&mut hasher);
            p.pos.y.to_bits().hash(&mut hasher);
        }

        hasher.finish()
    }
}
