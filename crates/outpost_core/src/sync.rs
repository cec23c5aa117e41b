//! Replica side of the protocol: applying server messages.

use tracing::{debug, info, warn};

use crate::enemy::{Enemy, EnemyState};
use crate::math::Vec2;
use crate::player::Player;
use crate::projectile::Projectile;
use crate::protocol::{ServerMessage, TerminalStatus};
use crate::structures::{Structure, StructureId, StructureState};
use crate::simulation::Simulation;
use crate::world::{GameStatus, World};

impl Simulation {
    /// Apply one message from the authoritative side.
    ///
    /// Only replicas accept messages; the authoritative side ignores them and
    /// returns `false`. Problems with a single entity are logged and skipped.
    pub fn apply_message(&mut self, message: ServerMessage) -> bool {
        if self.is_authoritative() {
            debug!(kind = message.kind(), "Authoritative side ignores server message");
            return false;
        }

        match message {
            ServerMessage::AssignId { data } => {
                info!(player = %data.id, "Assigned player id");
                self.set_local_player(data.id);
            }
            ServerMessage::InitialState { data } | ServerMessage::StateUpdate { data } => {
                self.world_mut().apply_full_snapshot(&data);
            }
            ServerMessage::StructureAdd { data } | ServerMessage::StructureUpdate { data } => {
                upsert_structure(self.world_mut(), &data);
            }
            ServerMessage::StructureRemove { net_id } => {
                remove_structures(self.world_mut(), std::slice::from_ref(&net_id));
            }
            ServerMessage::StructuresRemove { ids } => remove_structures(self.world_mut(), &ids),
            ServerMessage::EnemyAdd { data } => upsert_enemy(self.world_mut(), &data),
            ServerMessage::EnemiesRemove { ids } => {
                let world = self.world_mut();
                for id in ids {
                    world.enemies.remove(&id);
                }
            }
            ServerMessage::ProjectileAdd { data } => {
                let world = self.world_mut();
                match world.projectiles.get_mut(&data.net_id) {
                    Some(p) => p.apply_state(&data),
                    None => {
                        world.projectiles.insert(data.net_id, Projectile::from_state(&data));
                    }
                }
            }
            ServerMessage::ProjectilesRemove { ids } => {
                let world = self.world_mut();
                for id in ids {
                    world.projectiles.remove(&id);
                }
            }
            ServerMessage::PlayerJoin { data } => {
                let world = self.world_mut();
                if !world.players.contains_key(&data.id) {
                    info!(player = %data.id, name = %data.name, "Player joined");
                    world.insert_player(Player::from_state(&data));
                }
            }
            ServerMessage::PlayerLeave { player_id } => {
                self.world_mut().remove_player(player_id);
            }
            ServerMessage::ResourceUpdate { data } => self.world_mut().resources = data,
            ServerMessage::WaveUpdate { data } => self.world_mut().waves.apply_state(&data),
            ServerMessage::GameStatus { status } => {
                self.world_mut().status = match status {
                    TerminalStatus::Over => GameStatus::Over,
                    TerminalStatus::Won => GameStatus::Won,
                };
                info!(?status, "Game finished");
            }
            ServerMessage::Error { message } => {
                warn!(%message, "Server reported an error");
            }
        }
        true
    }
}

fn upsert_structure(world: &mut World, state: &StructureState) {
    let id = &state.net_id;
    if let Some(existing) = world.structures.get_mut(id) {
        match existing.apply_state(state) {
            Ok(()) => {
                world.refresh_power_roles(id);
                return;
            }
            Err(e) => {
                warn!(%id, error = %e, "Replacing mismatched structure");
                world.remove_structure_by_id(id);
            }
        }
    }
    match Structure::from_state(state) {
        Ok(structure) => {
            // Last write wins on a contended tile.
            if let Some(stale) = world.get_at(structure.pos).map(|s| s.id.clone()) {
                world.remove_structure_by_id(&stale);
            }
            world.insert_structure(structure);
        }
        Err(e) => warn!(%id, error = %e, "Skipping structure"),
    }
}

fn remove_structures(world: &mut World, ids: &[StructureId]) {
    for id in ids {
        if world.remove_structure_by_id(id).is_none() {
            debug!(%id, "Removal of unknown structure");
        }
    }
}

fn upsert_enemy(world: &mut World, state: &EnemyState) {
    let destination = world.core().map_or_else(|| world.world_size() * 0.5, Structure::center);
    world
        .enemies
        .entry(state.net_id)
        .or_insert_with(|| Enemy::new(state.net_id, Vec2::new(state.x, state.y), destination, state.max_hp))
        .apply_state(state);
}
