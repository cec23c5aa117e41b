//! Determinism testing utilities.
//!
//! Provides a harness for verifying that the simulation produces identical
//! results given identical inputs.
//!
//! # Testing Strategy
//!
//! Sources of non-determinism the harness is meant to catch:
//!
//! - **Map iteration order**: registries must iterate in id order. The core
//!   uses `BTreeMap`s throughout.
//!
//! - **System randomness**: every random choice must come from the world's
//!   seeded `ChaCha8Rng`.
//!
//! - **Lossy sync**: a snapshot applied to a fresh world must reproduce the
//!   same state hash, or replicas and saves drift from the host.

use std::thread;

use outpost_core::prelude::*;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Hashes from each run.
    pub hashes: Vec<u64>,
    /// Number of ticks simulated.
    pub ticks: u64,
}

impl DeterminismResult {
    /// Get all unique hashes (should be 1 for deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert that the simulation was deterministic, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the simulation produced different hashes across runs.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Ticks: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.ticks,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Run a setup multiple times and verify the final hashes agree.
pub fn verify_determinism<S, Setup, Step, HashFn>(
    runs: usize,
    ticks: u64,
    setup: Setup,
    step: Step,
    hash: HashFn,
) -> DeterminismResult
where
    Setup: Fn() -> S,
    Step: Fn(&mut S),
    HashFn: Fn(&S) -> u64,
{
    let mut hashes = Vec::with_capacity(runs);

    for _ in 0..runs {
        let mut state = setup();
        for _ in 0..ticks {
            step(&mut state);
        }
        hashes.push(hash(&state));
    }

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);

    DeterminismResult {
        is_deterministic,
        hashes,
        ticks,
    }
}

/// Run a [`Simulation`] twice at a fixed `dt` and compare final hashes.
pub fn verify_simulation_determinism<F>(setup_fn: F, num_ticks: u64, dt: f32) -> bool
where
    F: Fn() -> Simulation,
{
    verify_determinism(
        2,
        num_ticks,
        &setup_fn,
        |sim| {
            sim.tick(dt);
        },
        Simulation::state_hash,
    )
    .is_deterministic
}

/// Run `num_sims` simulations on scoped threads and collect final hashes.
///
/// # Panics
///
/// Panics if a simulation thread panics.
pub fn run_parallel_simulations<F>(setup_fn: F, num_sims: usize, num_ticks: u64, dt: f32) -> DeterminismResult
where
    F: Fn() -> Simulation + Sync,
{
    let hashes: Vec<u64> = thread::scope(|s| {
        let handles: Vec<_> = (0..num_sims)
            .map(|_| {
                s.spawn(|| {
                    let mut sim = setup_fn();
                    for _ in 0..num_ticks {
                        sim.tick(dt);
                    }
                    sim.state_hash()
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("simulation thread panicked"))
            .collect()
    });

    DeterminismResult {
        is_deterministic: hashes.windows(2).all(|w| w[0] == w[1]),
        hashes,
        ticks: num_ticks,
    }
}

/// Compare two runs tick-by-tick and return the first tick whose hashes
/// differ, or `None`.
pub fn find_first_divergence<F>(setup_fn: F, num_ticks: u64, dt: f32) -> Option<u64>
where
    F: Fn() -> Simulation,
{
    let mut sim1 = setup_fn();
    let mut sim2 = setup_fn();

    if sim1.state_hash() != sim2.state_hash() {
        return Some(0);
    }

    for tick in 1..=num_ticks {
        sim1.tick(dt);
        sim2.tick(dt);
        if sim1.state_hash() != sim2.state_hash() {
            return Some(tick);
        }
    }

    None
}

/// Run `num_ticks`, then check that a replica built from the snapshot (sent
/// through JSON) hashes the same as the source.
pub fn verify_snapshot_determinism<F>(setup_fn: F, num_ticks: u64, dt: f32) -> bool
where
    F: Fn() -> Simulation,
{
    let mut sim = setup_fn();
    for _ in 0..num_ticks {
        sim.tick(dt);
    }

    let Ok(text) = serde_json::to_string(&sim.world().full_snapshot()) else {
        return false;
    };
    let Ok(snapshot) = FullSnapshot::from_json(&text) else {
        return false;
    };
    let mut world = World::new(sim.world().config().clone());
    world.apply_full_snapshot(&snapshot);

    Simulation::replica(world).state_hash() == sim.state_hash()
}

/// Proptest strategies for world actions.
pub mod strategies {
    use outpost_core::prelude::*;
    use proptest::prelude::*;

    /// A tile on a `width x height` grid, with a one tile margin outside it so
    /// out-of-bounds handling is exercised too.
    pub fn arb_grid_pos(width: i32, height: i32) -> impl Strategy<Value = GridPos> {
        (-1..=width, -1..=height).prop_map(|(gx, gy)| GridPos::new(gx, gy))
    }

    /// Any buildable structure kind.
    pub fn arb_buildable_kind() -> impl Strategy<Value = StructureKind> {
        proptest::sample::select(StructureKind::BUILDABLE.to_vec())
    }

    /// Any kind with more than one tier.
    pub fn arb_upgradable_kind() -> impl Strategy<Value = StructureKind> {
        proptest::sample::select(vec![
            StructureKind::Drill,
            StructureKind::Conveyor,
            StructureKind::Turret,
        ])
    }

    /// Any orientation.
    pub fn arb_orientation() -> impl Strategy<Value = Orientation> {
        proptest::sample::select(Orientation::ALL.to_vec())
    }

    /// A resource pool between empty and comfortably rich.
    pub fn arb_resources() -> impl Strategy<Value = ResourceMap> {
        (0u32..400, 0u32..200).prop_map(|(copper, coal)| ResourceMap::new(copper, coal))
    }

    /// A frame time between 1 ms and 50 ms.
    pub fn arb_dt() -> impl Strategy<Value = f32> {
        0.001f32..0.05
    }

    /// Any intent on the default-sized grid.
    pub fn arb_intent() -> impl Strategy<Value = Intent> {
        let (w, h) = (40, 19);
        prop_oneof![
            (-1.0f32..1.0, -1.0f32..1.0).prop_map(|(x, y)| Intent::Move { x, y }),
            (arb_buildable_kind(), arb_grid_pos(w, h), arb_orientation()).prop_map(|(kind, pos, orient)| {
                Intent::Place {
                    kind,
                    gx: pos.gx,
                    gy: pos.gy,
                    orient,
                }
            }),
            arb_grid_pos(w, h).prop_map(|pos| Intent::Remove { gx: pos.gx, gy: pos.gy }),
            arb_grid_pos(w, h).prop_map(|pos| Intent::Upgrade { gx: pos.gx, gy: pos.gy }),
        ]
    }

    /// A sequence of intents.
    pub fn arb_intent_sequence(max_len: usize) -> impl Strategy<Value = Vec<Intent>> {
        proptest::collection::vec(arb_intent(), 0..max_len)
    }
}
