//! Global resource pool and cost tables.
//!
//! The world owns a single [`ResourceMap`]. It is only changed by validated
//! actions (build, refund, upgrade), item deliveries into the core, and kill
//! rewards. Spending is all-or-nothing: either every entry of a cost is
//! covered and deducted, or nothing changes.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A deliverable resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Copper ore; also turret ammunition.
    Copper,
    /// Coal; generator fuel.
    Coal,
}

impl ResourceKind {
    /// All resource kinds.
    pub const ALL: [ResourceKind; 2] = [ResourceKind::Copper, ResourceKind::Coal];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copper => write!(f, "copper"),
            Self::Coal => write!(f, "coal"),
        }
    }
}

/// A static cost table entry list, e.g. `&[(ResourceKind::Copper, 15)]`.
pub type Cost = &'static [(ResourceKind, u32)];

/// Starting copper for a new world.
pub const STARTING_COPPER: u32 = 200;

/// Starting coal for a new world.
pub const STARTING_COAL: u32 = 100;

/// Mapping from resource kind to stockpiled amount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceMap(BTreeMap<ResourceKind, u32>);

impl ResourceMap {
    /// Create a pool with explicit copper and coal amounts.
    #[must_use]
    pub fn new(copper: u32, coal: u32) -> Self {
        let mut map = BTreeMap::new();
        map.insert(ResourceKind::Copper, copper);
        map.insert(ResourceKind::Coal, coal);
        Self(map)
    }

    /// The pool a fresh world starts with.
    #[must_use]
    pub fn starting() -> Self {
        Self::new(STARTING_COPPER, STARTING_COAL)
    }

    /// Amount held of `kind`.
    #[must_use]
    pub fn get(&self, kind: ResourceKind) -> u32 {
        self.0.get(&kind).copied().unwrap_or(0)
    }

    /// Set the amount held of `kind`.
    pub fn set(&mut self, kind: ResourceKind, amount: u32) {
        self.0.insert(kind, amount);
    }

    /// Add `amount` of `kind`.
    pub fn add(&mut self, kind: ResourceKind, amount: u32) {
        let entry = self.0.entry(kind).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Check whether every entry of `cost` is covered.
    #[must_use]
    pub fn covers(&self, cost: &[(ResourceKind, u32)]) -> bool {
        cost.iter().all(|&(kind, amount)| self.get(kind) >= amount)
    }

    /// Deduct `cost` if fully covered.
    ///
    /// Returns true if the transaction succeeded; on false nothing was deducted.
    pub fn try_spend(&mut self, cost: &[(ResourceKind, u32)]) -> bool {
        if !self.covers(cost) {
            return false;
        }
        for &(kind, amount) in cost {
            let entry = self.0.entry(kind).or_insert(0);
            *entry -= amount;
        }
        true
    }

    /// Return a previously spent `cost` in full.
    pub fn refund(&mut self, cost: &[(ResourceKind, u32)]) {
        for &(kind, amount) in cost {
            self.add(kind, amount);
        }
    }

    /// Return `ratio` of `cost`, each entry floored.
    pub fn refund_fraction(&mut self, cost: &[(ResourceKind, u32)], ratio: f32) {
        for &(kind, amount) in cost {
            self.add(kind, (amount as f32 * ratio).floor() as u32);
        }
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.0.values().map(|&v| u64::from(v)).sum()
    }

    /// Iterate `(kind, amount)` pairs in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (ResourceKind, u32)> + '_ {
        self.0.iter().map(|(&k, &v)| (k, v))
    }
}
