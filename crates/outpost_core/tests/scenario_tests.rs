//! End-to-end gameplay scenarios.
//!
//! Each test drives a whole [`Simulation`] (or world) through a short
//! sequence of actions and ticks and checks the observable outcome.

use outpost_core::prelude::*;
use outpost_test_utils::fixtures::{
    self, empty_world_with_host, host_simulation, is_powered, power_line,
};

const DT: f32 = 0.05;

// =============================================================================
// Economy
// =============================================================================

#[test]
fn test_drill_off_patch_is_rejected_without_charge() {
    let mut world = fixtures::generated_world();
    assert_eq!(world.resources(), &ResourceMap::new(200, 100));

    let core = world.core().map(|c| c.pos).expect("core");
    let tile = GridPos::new(core.gx + 1, core.gy - 1);
    assert_eq!(world.terrain_at(tile), None);

    assert!(!world.place_structure(PlayerId::HOST, StructureKind::Drill, tile, Orientation::East));
    assert_eq!(world.resources(), &ResourceMap::new(200, 100));
    assert!(world.get_at(tile).is_none());
    assert!(world.drain_outbox().is_empty());
}

#[test]
fn test_drill_feeds_core_through_conveyor() {
    let mut world = fixtures::generated_world();
    let core = world.core().map(|c| c.pos).expect("core");
    let patch = GridPos::new(core.gx - 3, core.gy);
    world.set_terrain(patch, ResourceKind::Coal);

    assert!(world.place_structure(PlayerId::HOST, StructureKind::Drill, patch, Orientation::East));
    for gx in core.gx - 2..core.gx {
        let tile = GridPos::new(gx, core.gy);
        assert!(world.place_structure(PlayerId::HOST, StructureKind::Conveyor, tile, Orientation::East));
    }
    let coal_before = world.resources().get(ResourceKind::Coal);

    let mut sim = Simulation::authoritative(world, Some(PlayerId::HOST));
    for _ in 0..200 {
        sim.tick(DT);
    }
    assert!(sim.world().resources().get(ResourceKind::Coal) > coal_before);
}

// =============================================================================
// Power
// =============================================================================

#[test]
fn test_single_coal_powers_consumer_until_burnt() {
    let mut world = empty_world_with_host(1, 1);
    let (generator, _pole, consumer) = power_line(&mut world, 4, 8);
    assert!(world.deliver_item(GridPos::new(4, 8), ResourceKind::Coal));

    let mut sim = Simulation::authoritative(world, None);
    while sim.tick(DT).power.is_none() {}
    assert!(is_powered(sim.world(), &consumer));

    // One coal burns for 3 s; give the generator and the power step time to notice.
    for _ in 0..80 {
        sim.tick(DT);
    }
    match sim.world().get_by_id(&generator).map(|s| &s.variant) {
        Some(Variant::CoalGenerator(g)) => {
            assert_eq!(g.buffer, 0);
            assert!(!g.is_generating);
        }
        other => panic!("generator missing: {other:?}"),
    }
    assert!(!is_powered(sim.world(), &consumer));
}

#[test]
fn test_battery_keeps_consumer_up_after_fuel_runs_out() {
    let mut world = empty_world_with_host(1, 1);
    let (_generator, _pole, consumer) = power_line(&mut world, 4, 8);
    let battery = fixtures::put(&mut world, StructureKind::Battery, 8, 11);
    fixtures::set_battery_charge(&mut world, &battery, 1000.0);
    assert!(world.deliver_item(GridPos::new(4, 8), ResourceKind::Coal));

    let mut sim = Simulation::authoritative(world, None);
    for _ in 0..120 {
        sim.tick(DT);
    }
    assert!(is_powered(sim.world(), &consumer));
}

// =============================================================================
// Combat
// =============================================================================

#[test]
fn test_projectile_hit_damages_enemy_and_is_removed() {
    let mut world = empty_world_with_host(1, 1);
    // With no core, enemies head for the map centre; parking one there keeps it still.
    let center = world.world_size() * 0.5;
    let enemy = world.spawn_enemy_at(center, 50.0);
    let origin = center - Vec2::new(6.0, 0.0);
    let shot = world.spawn_projectile(origin, enemy, center, 30.0);

    let mut sim = Simulation::authoritative(world, None);
    let events = sim.tick(0.01);

    assert_eq!(sim.world().enemy(enemy).map(|e| e.hp), Some(20.0));
    assert!(sim.world().projectile(shot).is_none());
    assert!(events
        .messages
        .iter()
        .any(|m| matches!(m, ServerMessage::ProjectilesRemove { ids } if ids == &vec![shot])));
}

#[test]
fn test_turret_defends_against_wave() {
    let mut sim = host_simulation();
    let core = sim.world().core().map(|c| c.pos).expect("core");
    let turret = fixtures::put(sim.world_mut(), StructureKind::Turret, core.gx, core.gy - 2);
    for _ in 0..12 {
        sim.world_mut().deliver_item(GridPos::new(core.gx, core.gy - 2), ResourceKind::Copper);
    }

    let center = sim.world().get_by_id(&turret).map(Structure::center).expect("turret");
    let enemy = sim.world_mut().spawn_enemy_at(center + Vec2::new(0.0, -96.0), 50.0);
    let copper = sim.world().resources().get(ResourceKind::Copper);
    for _ in 0..180 {
        sim.tick(1.0 / 60.0);
    }
    assert!(sim.world().enemy(enemy).is_none());
    assert!(sim.world().resources().get(ResourceKind::Copper) >= copper + 10);
}

// =============================================================================
// Waves
// =============================================================================

#[test]
fn test_expired_cooldown_starts_first_wave() {
    let mut sim = host_simulation();
    sim.world_mut().waves_mut().set_timer(0.0);
    assert_eq!(sim.world().waves().number(), 0);

    let events = sim.tick(1.0 / 60.0);
    assert!(events.wave_started);
    assert_eq!(sim.world().waves().number(), 1);
    assert!(sim.world().waves().in_wave());
    assert_eq!(sim.world().waves().enemy_hp(), 50.0);
}

#[test]
fn test_undefended_core_falls() {
    let mut sim = host_simulation();
    let core = sim.world().core().map(|c| c.center()).expect("core");
    for _ in 0..30 {
        sim.world_mut().spawn_enemy_at(core + Vec2::new(0.0, -10.0), 1e6);
    }

    let mut finished = None;
    for _ in 0..60 * 20 {
        if let Some(status) = sim.tick(1.0 / 60.0).finished {
            finished = Some(status);
            break;
        }
    }
    assert_eq!(finished, Some(GameStatus::Over));
    assert!(sim.world().core().is_none());
    assert_eq!(sim.world().enemies().count(), 0);
}
