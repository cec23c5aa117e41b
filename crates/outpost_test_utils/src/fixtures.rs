//! Test fixtures and helpers.
//!
//! Pre-built worlds and structure setups for consistent testing.

use outpost_core::prelude::*;

/// Seed used by every fixture.
pub const FIXTURE_SEED: u64 = 0x00C0_FFEE;

/// Default-sized configuration with the fixture seed.
#[must_use]
pub fn config() -> WorldConfig {
    WorldConfig {
        seed: FIXTURE_SEED,
        ..WorldConfig::default()
    }
}

/// Empty world: no core, no terrain, one host player at `(gx, gy)`'s center.
#[must_use]
pub fn empty_world_with_host(gx: i32, gy: i32) -> World {
    let mut world = World::new(config());
    world.insert_player(Player::new(
        PlayerId::HOST,
        GridPos::new(gx, gy).center(),
        &PlayerProfile::default(),
    ));
    world
}

/// Generated world with core, host and patches.
#[must_use]
pub fn generated_world() -> World {
    World::generate(config(), &PlayerProfile::default())
}

/// Authoritative simulation over [`generated_world`] with the host local.
#[must_use]
pub fn host_simulation() -> Simulation {
    Simulation::authoritative(generated_world(), Some(PlayerId::HOST))
}

/// Replica initialised from `source`'s current snapshot.
#[must_use]
pub fn replica_of(source: &World) -> Simulation {
    let mut world = World::new(source.config().clone());
    world.apply_full_snapshot(&source.full_snapshot());
    Simulation::replica(world)
}

/// Insert a structure directly, bypassing cost and reach checks.
///
/// # Panics
///
/// Panics if the tile is taken or out of bounds.
pub fn put(world: &mut World, kind: StructureKind, gx: i32, gy: i32) -> StructureId {
    put_facing(world, kind, gx, gy, Orientation::East)
}

/// [`put`] with an explicit orientation.
///
/// # Panics
///
/// Panics if the tile is taken or out of bounds.
pub fn put_facing(world: &mut World, kind: StructureKind, gx: i32, gy: i32, facing: Orientation) -> StructureId {
    let structure = Structure::new(kind, GridPos::new(gx, gy), facing);
    let id = structure.id.clone();
    assert!(world.insert_structure(structure), "could not insert {kind:?} at {gx},{gy}");
    id
}

/// Load a generator with `coal` units and mark it burning if non-empty.
///
/// # Panics
///
/// Panics if `id` is not a coal generator.
pub fn fuel_generator(world: &mut World, id: &StructureId, coal: u32) {
    match world.structure_mut(id).map(|s| &mut s.variant) {
        Some(Variant::CoalGenerator(g)) => {
            g.buffer = coal;
            g.is_generating = coal > 0;
        }
        other => panic!("{id} is not a generator: {other:?}"),
    }
}

/// Set a battery's charge.
///
/// # Panics
///
/// Panics if `id` is not a battery.
pub fn set_battery_charge(world: &mut World, id: &StructureId, charge: f32) {
    match world.structure_mut(id).map(|s| &mut s.variant) {
        Some(Variant::Battery(b)) => b.charge = charge,
        other => panic!("{id} is not a battery: {other:?}"),
    }
}

/// Whether the structure exists and is powered.
#[must_use]
pub fn is_powered(world: &World, id: &StructureId) -> bool {
    world.get_by_id(id).is_some_and(|s| s.is_powered)
}

/// Generator, pole and reconstructor in a row four tiles apart, starting at
/// `(gx, gy)`. Returns their ids in that order.
pub fn power_line(world: &mut World, gx: i32, gy: i32) -> (StructureId, StructureId, StructureId) {
    let generator = put(world, StructureKind::CoalGenerator, gx, gy);
    let pole = put(world, StructureKind::PowerPole, gx + 4, gy);
    let consumer = put(world, StructureKind::Reconstructor, gx + 8, gy);
    (generator, pole, consumer)
}
