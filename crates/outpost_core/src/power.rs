//! Power distribution engine.
//!
//! Runs on the authoritative world only, every [`POWER_INTERVAL`] seconds:
//!
//! 1. Reset node and consumer power flags.
//! 2. Breadth-first discovery of networks, seeded from burning generators and
//!    charged batteries. Nodes link when their centers are within
//!    [`POWER_RADIUS`]; depth is capped at [`POWER_DEPTH_LIMIT`]. A node
//!    belongs to at most one network per step.
//! 3. Per network: generation, attached consumer demand, and battery
//!    discharge/charge headroom over the elapsed interval.
//! 4. Sufficient networks (`generation + max discharge >= demand`) power all
//!    attached consumers and settle the balance against batteries in
//!    proportion to each battery's share. Insufficient networks power nothing
//!    and only trickle-charge batteries from generation.
//!
//! A consumer attaches to the nearest in-radius node of the first network that
//! reaches it.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::grid::GridPos;
use crate::math::{tile_span, EPSILON, TILE_SIZE};
use crate::structures::stats::{BATTERY_CAPACITY, BATTERY_DISCHARGE_RATE};
use crate::structures::{StructureId, Variant};
use crate::world::World;

/// Link reach between nodes, and between a consumer and its node.
pub const POWER_RADIUS: f32 = 5.0 * TILE_SIZE;
/// Maximum BFS depth from a seed.
pub const POWER_DEPTH_LIMIT: u32 = 15;
/// Seconds between power steps.
pub const POWER_INTERVAL: f32 = 0.3;

/// Outcome for one discovered network.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NetworkReport {
    /// Member nodes in discovery order.
    pub nodes: Vec<StructureId>,
    /// Consumers attached to this network.
    pub consumers: Vec<StructureId>,
    /// Total generation rate.
    pub generation: f32,
    /// Total demand rate of attached consumers.
    pub demand: f32,
    /// Whether attached consumers were powered.
    pub sufficient: bool,
    /// Energy stored into batteries this step.
    pub charged: f32,
    /// Energy drawn from batteries this step.
    pub discharged: f32,
}

/// Outcome of one power step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerReport {
    /// One entry per discovered network.
    pub networks: Vec<NetworkReport>,
}

/// Tooltip figures for the network around one node, computed from synced
/// link data so replicas can show them too.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Generation rate.
    pub generation: f32,
    /// Consumption of consumers fed by this network.
    pub consumption: f32,
    /// Total battery capacity.
    pub capacity: f32,
    /// Total battery charge.
    pub charge: f32,
    /// Node count.
    pub nodes: usize,
}

impl World {
    /// Run one power step over `elapsed` seconds.
    pub fn distribute_power(&mut self, elapsed: f32) -> PowerReport {
        self.reset_power_flags();

        let seeds: Vec<StructureId> = self
            .power_nodes
            .iter()
            .filter(|id| {
                self.structures.get(*id).is_some_and(|s| match &s.variant {
                    Variant::CoalGenerator(g) => g.is_generating,
                    Variant::Battery(b) => b.charge > EPSILON,
                    _ => false,
                })
            })
            .cloned()
            .collect();

        let mut visited = BTreeSet::new();
        let mut networks = Vec::new();
        for seed in seeds {
            if !visited.contains(&seed) {
                networks.push(self.discover_network(&seed, &mut visited));
            }
        }

        let mut attached = BTreeSet::new();
        let networks = networks
            .into_iter()
            .map(|nodes| self.balance_network(nodes, &mut attached, elapsed))
            .collect();
        PowerReport { networks }
    }

    fn reset_power_flags(&mut self) {
        for id in &self.power_nodes {
            if let Some(s) = self.structures.get_mut(id) {
                s.is_on_grid = false;
                s.power_links.clear();
                if let Variant::Battery(b) = &mut s.variant {
                    b.is_charging = false;
                    b.is_discharging = false;
                }
            }
        }
        for id in &self.power_consumers {
            if let Some(s) = self.structures.get_mut(id) {
                s.is_powered = false;
                s.power_source = None;
            }
        }
    }

    fn discover_network(
        &mut self,
        seed: &StructureId,
        visited: &mut BTreeSet<StructureId>,
    ) -> Vec<StructureId> {
        let radius_sq = POWER_RADIUS * POWER_RADIUS;
        let span = tile_span(POWER_RADIUS, 1);
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        let mut queue = VecDeque::from([(seed.clone(), 0_u32)]);
        visited.insert(seed.clone());

        while let Some((id, depth)) = queue.pop_front() {
            let Some(node) = self.structures.get(&id) else {
                continue;
            };
            let (pos, center) = (node.pos, node.center());
            nodes.push(id.clone());
            if depth >= POWER_DEPTH_LIMIT {
                continue;
            }

            for cell in self.grid.square_around(pos, span) {
                if cell == pos {
                    continue;
                }
                let Some(neighbor) = self.grid.get(cell).and_then(|n| self.structures.get(n)) else {
                    continue;
                };
                if !neighbor.is_power_node()
                    || visited.contains(&neighbor.id)
                    || neighbor.center().distance_squared(center) > radius_sq
                {
                    continue;
                }
                visited.insert(neighbor.id.clone());
                queue.push_back((neighbor.id.clone(), depth + 1));
                edges.push(((id.clone(), pos), (neighbor.id.clone(), cell)));
            }
        }

        for ((a, a_pos), (b, b_pos)) in edges {
            self.link_nodes(&a, b_pos);
            self.link_nodes(&b, a_pos);
        }
        for id in &nodes {
            if let Some(s) = self.structures.get_mut(id) {
                s.is_on_grid = true;
            }
        }
        nodes
    }

    fn link_nodes(&mut self, id: &StructureId, other: GridPos) {
        if let Some(s) = self.structures.get_mut(id) {
            if !s.power_links.contains(&other) {
                s.power_links.push(other);
            }
        }
    }

    fn balance_network(
        &mut self,
        nodes: Vec<StructureId>,
        attached: &mut BTreeSet<StructureId>,
        elapsed: f32,
    ) -> NetworkReport {
        let radius_sq = POWER_RADIUS * POWER_RADIUS;
        let members: Vec<_> = nodes.iter().filter_map(|id| self.structures.get(id)).collect();
        let generation: f32 = members.iter().map(|s| s.power_generation()).sum();

        let mut consumers = Vec::new();
        let mut demand = 0.0;
        for cid in &self.power_consumers {
            if attached.contains(cid) {
                continue;
            }
            let Some(consumer) = self.structures.get(cid) else {
                continue;
            };
            let center = consumer.center();
            let mut nearest: Option<(f32, GridPos)> = None;
            for node in &members {
                let d = node.center().distance_squared(center);
                if d <= radius_sq && nearest.map_or(true, |(best, _)| d < best) {
                    nearest = Some((d, node.pos));
                }
            }
            if let Some((_, source)) = nearest {
                consumers.push((cid.clone(), source));
                demand += consumer.power_consumption();
            }
        }

        let batteries: Vec<StructureId> = members
            .iter()
            .filter(|s| s.is_power_storage())
            .map(|s| s.id.clone())
            .collect();
        let (mut available_discharge, mut available_charge, mut charged_rate) = (0.0, 0.0, 0.0);
        for s in &members {
            if let Variant::Battery(b) = &s.variant {
                available_discharge += b.max_discharge(elapsed);
                available_charge += b.max_charge(elapsed);
                if b.charge > EPSILON {
                    charged_rate += BATTERY_DISCHARGE_RATE;
                }
            }
        }
        let max_discharge_rate = if elapsed > EPSILON {
            available_discharge / elapsed
        } else {
            charged_rate
        };

        let sufficient = generation + max_discharge_rate >= demand - EPSILON;
        let (mut charge, mut discharge) = (0.0, 0.0);
        if sufficient {
            for (cid, source) in &consumers {
                if let Some(c) = self.structures.get_mut(cid) {
                    c.is_powered = true;
                    c.power_source = Some(*source);
                }
            }
            let balance = generation - demand;
            if balance < -EPSILON {
                discharge = (-balance * elapsed).min(available_discharge);
            } else if balance > EPSILON {
                charge = (balance * elapsed).min(available_charge);
            }
        } else {
            charge = (generation * elapsed).min(available_charge);
        }

        for id in &batteries {
            let Some(Variant::Battery(b)) = self.structures.get_mut(id).map(|s| &mut s.variant) else {
                continue;
            };
            if discharge > EPSILON && available_discharge > EPSILON {
                let provide = b.max_discharge(elapsed) * (discharge / available_discharge);
                if provide > EPSILON {
                    b.charge -= provide;
                    b.is_discharging = true;
                }
            }
            if charge > EPSILON && available_charge > EPSILON {
                let absorb = b.max_charge(elapsed) * (charge / available_charge);
                if absorb > EPSILON {
                    b.charge += absorb;
                    b.is_charging = true;
                }
            }
            b.charge = b.charge.clamp(0.0, BATTERY_CAPACITY);
        }

        debug!(
            nodes = nodes.len(),
            consumers = consumers.len(),
            generation,
            demand,
            sufficient,
            charge,
            discharge,
            "Power network balanced"
        );

        let consumer_ids = consumers.into_iter().map(|(id, _)| id).collect::<Vec<_>>();
        attached.extend(consumer_ids.iter().cloned());
        NetworkReport {
            nodes,
            consumers: consumer_ids,
            generation,
            demand,
            sufficient,
            charged: charge,
            discharged: discharge,
        }
    }

    /// Tooltip statistics for the network containing `start`.
    ///
    /// Walks the synced link tiles, so it works on replicas. `None` if `start`
    /// is not an on-grid power node.
    #[must_use]
    pub fn network_stats(&self, start: &StructureId) -> Option<NetworkStats> {
        let first = self.structures.get(start)?;
        if !first.is_power_node() || !first.is_on_grid {
            return None;
        }

        let mut stats = NetworkStats::default();
        let mut positions = BTreeSet::new();
        let mut seen = BTreeSet::from([start.clone()]);
        let mut queue = VecDeque::from([start.clone()]);

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.structures.get(&id) else {
                continue;
            };
            if !node.is_power_node() || !node.is_on_grid {
                continue;
            }
            positions.insert(node.pos);
            stats.nodes += 1;
            stats.generation += node.power_generation();
            if let Variant::Battery(b) = &node.variant {
                stats.capacity += BATTERY_CAPACITY;
                stats.charge += b.charge;
            }
            for link in &node.power_links {
                if let Some(next) = self.grid.get(*link) {
                    if seen.insert(next.clone()) {
                        queue.push_back(next.clone());
                    }
                }
            }
        }

        stats.consumption = self
            .structures
            .values()
            .filter(|s| s.is_power_consumer() && s.is_powered)
            .filter(|s| s.power_source.is_some_and(|src| positions.contains(&src)))
            .map(|s| s.power_consumption())
            .sum();
        Some(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::grid::Orientation;
    use crate::structures::{Structure, StructureKind};

    fn place(world: &mut World, kind: StructureKind, gx: i32, gy: i32) -> StructureId {
        let s = Structure::new(kind, GridPos::new(gx, gy), Orientation::East);
        let id = s.id.clone();
        assert!(world.insert_structure(s));
        id
    }

    fn fuel(world: &mut World, id: &StructureId, coal: u32) {
        if let Some(Variant::CoalGenerator(g)) = world.structure_mut(id).map(|s| &mut s.variant) {
            g.buffer = coal;
            g.is_generating = coal > 0;
        }
    }

    fn set_charge(world: &mut World, id: &StructureId, charge: f32) {
        if let Some(Variant::Battery(b)) = world.structure_mut(id).map(|s| &mut s.variant) {
            b.charge = charge;
        }
    }

    fn battery_charge(world: &World, id: &StructureId) -> f32 {
        match world.get_by_id(id).map(|s| &s.variant) {
            Some(Variant::Battery(b)) => b.charge,
            _ => f32::NAN,
        }
    }

    fn powered(world: &World, id: &StructureId) -> bool {
        world.get_by_id(id).is_some_and(|s| s.is_powered)
    }

    #[test]
    fn test_generator_powers_consumer_through_pole() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 2, 2);
        let pole = place(&mut world, StructureKind::PowerPole, 6, 2);
        let recon = place(&mut world, StructureKind::Reconstructor, 10, 2);
        fuel(&mut world, &gen, 3);

        let report = world.distribute_power(POWER_INTERVAL);
        assert_eq!(report.networks.len(), 1);
        assert!(powered(&world, &recon));
        assert_eq!(world.get_by_id(&recon).and_then(|s| s.power_source), Some(GridPos::new(6, 2)));
        assert!(world.get_by_id(&gen).is_some_and(|s| s.power_links == vec![GridPos::new(6, 2)]));
        assert!(world.get_by_id(&pole).is_some_and(|s| s.is_on_grid));
    }

    #[test]
    fn test_nodes_beyond_radius_do_not_link() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 2, 2);
        let far = place(&mut world, StructureKind::PowerPole, 8, 2);
        fuel(&mut world, &gen, 1);

        world.distribute_power(POWER_INTERVAL);
        assert!(world.get_by_id(&gen).is_some_and(|s| s.power_links.is_empty()));
        assert!(world.get_by_id(&far).is_some_and(|s| !s.is_on_grid));
    }

    #[test]
    fn test_unfuelled_network_is_not_discovered() {
        let mut world = World::new(WorldConfig::default());
        place(&mut world, StructureKind::CoalGenerator, 2, 2);
        let recon = place(&mut world, StructureKind::Reconstructor, 3, 2);
        let report = world.distribute_power(POWER_INTERVAL);
        assert!(report.networks.is_empty());
        assert!(!powered(&world, &recon));
    }

    #[test]
    fn test_insufficient_network_powers_nothing_but_trickle_charges() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 5, 5);
        let battery = place(&mut world, StructureKind::Battery, 6, 5);
        fuel(&mut world, &gen, 1);
        // 30 generation vs 4 x 10 demand, empty battery.
        let consumers: Vec<_> = (0..4)
            .map(|i| place(&mut world, StructureKind::Reconstructor, 5 + i, 7))
            .collect();

        let report = world.distribute_power(1.0);
        assert!(!report.networks[0].sufficient);
        assert!(consumers.iter().all(|c| !powered(&world, c)));
        // Charge limited by rate: 40/s over 1s, generation 30 over 1s.
        assert!((battery_charge(&world, &battery) - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_battery_covers_deficit() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 5, 5);
        let battery = place(&mut world, StructureKind::Battery, 6, 5);
        fuel(&mut world, &gen, 1);
        set_charge(&mut world, &battery, 100.0);
        let consumers: Vec<_> = (0..4)
            .map(|i| place(&mut world, StructureKind::Reconstructor, 5 + i, 7))
            .collect();

        let report = world.distribute_power(1.0);
        assert!(report.networks[0].sufficient);
        assert!(consumers.iter().all(|c| powered(&world, c)));
        // Deficit of 10 over 1s.
        assert!((battery_charge(&world, &battery) - 90.0).abs() < 1e-3);
        assert!((report.networks[0].discharged - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_surplus_split_by_headroom() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 5, 5);
        let a = place(&mut world, StructureKind::Battery, 6, 5);
        let b = place(&mut world, StructureKind::Battery, 4, 5);
        fuel(&mut world, &gen, 1);
        set_charge(&mut world, &b, BATTERY_CAPACITY - 5.0);

        world.distribute_power(1.0);
        // Headroom 40 and 5; 30 surplus split 40:5.
        let got_a = battery_charge(&world, &a);
        let got_b = battery_charge(&world, &b) - (BATTERY_CAPACITY - 5.0);
        assert!((got_a + got_b - 30.0).abs() < 1e-2);
        assert!((got_a / got_b - 8.0).abs() < 1e-2);
    }

    #[test]
    fn test_charged_battery_alone_seeds_network() {
        let mut world = World::new(WorldConfig::default());
        let battery = place(&mut world, StructureKind::Battery, 5, 5);
        let recon = place(&mut world, StructureKind::Reconstructor, 6, 5);
        set_charge(&mut world, &battery, 50.0);

        world.distribute_power(0.3);
        assert!(powered(&world, &recon));
        assert!((battery_charge(&world, &battery) - 47.0).abs() < 1e-3);
    }

    #[test]
    fn test_network_stats_follow_links() {
        let mut world = World::new(WorldConfig::default());
        let gen = place(&mut world, StructureKind::CoalGenerator, 2, 2);
        let pole = place(&mut world, StructureKind::PowerPole, 6, 2);
        let battery = place(&mut world, StructureKind::Battery, 10, 2);
        place(&mut world, StructureKind::Reconstructor, 11, 3);
        fuel(&mut world, &gen, 2);
        set_charge(&mut world, &battery, 500.0);

        world.distribute_power(0.3);
        let stats = world.network_stats(&pole).expect("on grid");
        assert_eq!(stats.nodes, 3);
        assert_eq!(stats.generation, 30.0);
        assert_eq!(stats.consumption, 10.0);
        assert_eq!(stats.capacity, BATTERY_CAPACITY);
    }
}
