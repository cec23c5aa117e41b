//! Snapshot and replication tests.
//!
//! These run a host simulation, push everything it broadcasts through the
//! JSON wire encoding, and check that a replica fed those messages converges.

use std::collections::BTreeSet;

use outpost_core::prelude::*;
use outpost_test_utils::determinism::verify_snapshot_determinism;
use outpost_test_utils::fixtures::{self, host_simulation, replica_of};

const DT: f32 = 1.0 / 60.0;

/// Encode and decode a message the way the network layer does.
fn over_the_wire(message: &ServerMessage) -> ServerMessage {
    let bytes = serde_json::to_vec(message).expect("encode");
    ServerMessage::from_slice(&bytes).expect("decode")
}

/// Host with a loaded turret by the core and the first wave due.
fn defended_host() -> Simulation {
    let mut sim = host_simulation();
    let core = sim.world().core().map(|c| c.pos).expect("core");
    for dx in [-2, 2] {
        let pos = GridPos::new(core.gx + dx, core.gy - 1);
        assert!(sim.apply_intent(
            PlayerId::HOST,
            &Intent::Place {
                kind: StructureKind::Turret,
                gx: pos.gx,
                gy: pos.gy,
                orient: Orientation::North,
            }
        ));
        for _ in 0..12 {
            sim.world_mut().deliver_item(pos, ResourceKind::Copper);
        }
    }
    sim.world_mut().waves_mut().set_timer(0.0);
    sim
}

// =============================================================================
// Snapshots
// =============================================================================

#[test]
fn test_round_trip_through_json() {
    let mut sim = defended_host();
    for _ in 0..300 {
        sim.tick(DT);
    }
    let source = sim.world();
    let text = serde_json::to_string(&source.full_snapshot()).expect("encode");
    let snapshot = FullSnapshot::from_json(&text).expect("decode");

    let mut world = World::new(source.config().clone());
    world.apply_full_snapshot(&snapshot);

    assert_eq!(world.full_snapshot(), source.full_snapshot());
    assert_eq!(world.resources(), source.resources());
    assert_eq!(world.players().count(), source.players().count());
    assert_eq!(world.enemies().count(), source.enemies().count());
    assert_eq!(world.projectiles().count(), source.projectiles().count());
}

#[test]
fn test_applying_twice_is_idempotent() {
    let mut sim = defended_host();
    for _ in 0..200 {
        sim.tick(DT);
    }
    let snapshot = sim.world().full_snapshot();

    let mut once = World::new(fixtures::config());
    once.apply_full_snapshot(&snapshot);
    let mut twice = World::new(fixtures::config());
    twice.apply_full_snapshot(&snapshot);
    twice.apply_full_snapshot(&snapshot);

    assert_eq!(once.full_snapshot(), twice.full_snapshot());
    assert_eq!(
        Simulation::replica(once).state_hash(),
        Simulation::replica(twice).state_hash()
    );
}

#[test]
fn test_snapshot_hash_matches_host_mid_wave() {
    assert!(verify_snapshot_determinism(defended_host, 400, DT));
}

#[test]
fn test_save_snapshot_restores_playable_world() {
    let mut sim = defended_host();
    for _ in 0..120 {
        sim.tick(DT);
    }
    let save = sim.world().full_snapshot().for_save(SessionMode::Host);
    let text = serde_json::to_string_pretty(&save).expect("encode");
    let loaded = FullSnapshot::from_json(&text).expect("decode");
    assert_eq!(loaded.game_mode_for_save, Some(SessionMode::Host));

    let world = World::restore(fixtures::config(), &loaded, &PlayerProfile::default()).expect("restore");
    assert_eq!(world.waves().number(), 1);
    assert_eq!(world.structures().count(), sim.world().structures().count());

    // Fresh ids must not collide with restored ones.
    let mut resumed = Simulation::authoritative(world, Some(PlayerId::HOST));
    let before: BTreeSet<EnemyId> = resumed.world().enemies().map(|e| e.id).collect();
    let id = resumed.world_mut().spawn_enemy_at(Vec2::new(10.0, 10.0), 50.0);
    assert!(!before.contains(&id));
}

// =============================================================================
// Incremental replication
// =============================================================================

#[test]
fn test_replica_tracks_entity_sets_from_messages() {
    let mut host = defended_host();
    let mut replica = replica_of(host.world());

    for _ in 0..600 {
        for message in host.tick(DT).messages {
            assert!(replica.apply_message(over_the_wire(&message)));
        }
        replica.tick(DT);

        let host_enemies: BTreeSet<EnemyId> = host.world().enemies().map(|e| e.id).collect();
        let replica_enemies: BTreeSet<EnemyId> = replica.world().enemies().map(|e| e.id).collect();
        assert_eq!(host_enemies, replica_enemies);

        let host_shots: BTreeSet<ProjectileId> = host.world().projectiles().map(|p| p.id).collect();
        let replica_shots: BTreeSet<ProjectileId> = replica.world().projectiles().map(|p| p.id).collect();
        assert_eq!(host_shots, replica_shots);
    }
    assert_eq!(replica.world().resources(), host.world().resources());
    assert_eq!(replica.world().waves().number(), host.world().waves().number());
    assert_eq!(replica.world().waves().in_wave(), host.world().waves().in_wave());
}

#[test]
fn test_periodic_state_update_converges_replica() {
    let mut host = defended_host();
    let mut replica = replica_of(host.world());

    for tick in 1..=480u32 {
        for message in host.tick(DT).messages {
            replica.apply_message(over_the_wire(&message));
        }
        if tick % 3 == 0 {
            let update = ServerMessage::StateUpdate {
                data: Box::new(host.world().full_snapshot()),
            };
            replica.apply_message(over_the_wire(&update));
        }
        replica.tick(DT);
    }

    let update = ServerMessage::StateUpdate {
        data: Box::new(host.world().full_snapshot()),
    };
    assert!(replica.apply_message(over_the_wire(&update)));
    assert_eq!(replica.world().full_snapshot(), host.world().full_snapshot());
    assert_eq!(replica.state_hash(), host.state_hash());
}

#[test]
fn test_replica_intents_never_mutate_shared_state() {
    let host = host_simulation();
    let mut replica = replica_of(host.world());
    let core = host.world().core().map(|c| c.pos).expect("core");

    let place = Intent::Place {
        kind: StructureKind::Wall,
        gx: core.gx + 1,
        gy: core.gy - 1,
        orient: Orientation::East,
    };
    assert!(!replica.apply_intent(PlayerId::HOST, &place));
    assert!(!replica.apply_intent(PlayerId::HOST, &Intent::Upgrade { gx: core.gx, gy: core.gy }));
    assert_eq!(replica.world().full_snapshot(), host.world().full_snapshot());
}
