//! Simulation benchmarks for outpost_core.
//!
//! Run with: `cargo bench -p outpost_core`

// Benchmark binaries don't need docs on macro-generated functions
#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use outpost_core::prelude::*;

/// A wide grid covered in a lattice of poles with generators, batteries and
/// reconstructors spread through it.
fn powered_world() -> World {
    let config = WorldConfig {
        grid_width: 80,
        grid_height: 40,
        ..WorldConfig::default()
    };
    let mut world = World::new(config);
    for gx in (0..80).step_by(3) {
        for gy in (0..40).step_by(3) {
            let kind = match (gx / 3 + gy / 3) % 7 {
                0 => StructureKind::CoalGenerator,
                1 => StructureKind::Battery,
                2 => StructureKind::Reconstructor,
                _ => StructureKind::PowerPole,
            };
            world.insert_structure(Structure::new(kind, GridPos::new(gx, gy), Orientation::East));
        }
    }
    let ids: Vec<StructureId> = world
        .structures()
        .filter(|s| s.kind() == StructureKind::CoalGenerator)
        .map(|s| s.id.clone())
        .collect();
    for id in ids {
        if let Some(Variant::CoalGenerator(g)) = world.structure_mut(&id).map(|s| &mut s.variant) {
            g.buffer = 10;
            g.is_generating = true;
        }
    }
    world
}

/// Runs simulation benchmarks for the outpost_core crate.
pub fn simulation_benchmark(c: &mut Criterion) {
    let world = powered_world();
    c.bench_function("power_distribution", |b| {
        b.iter_batched(
            || world.clone(),
            |mut w| black_box(w.distribute_power(0.3)),
            criterion::BatchSize::SmallInput,
        )
    });

    let mut sim = Simulation::authoritative(
        World::generate(WorldConfig::default(), &PlayerProfile::default()),
        Some(PlayerId::HOST),
    );
    sim.world_mut().waves_mut().set_timer(0.0);
    c.bench_function("tick_in_wave", |b| {
        b.iter(|| black_box(sim.tick(1.0 / 60.0).messages.len()));
    });
}

criterion_group!(benches, simulation_benchmark);
criterion_main!(benches);
