//! Cascade tree of sample rings
//!
//! A cascade owns every ring in an arena and routes the summary statistic of a
//! ring that just completed a window into the rings it feeds. The topology is
//! declared with [`CascadeBuilder`] and checked once in [`CascadeBuilder::build`];
//! after that it never changes.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, StationError};
use crate::ring::{RawData, SampleRing, Stats};

pub use crate::ring::Statistic;

/// Handle for a tier inside a cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TierId(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Edge {
    statistic: Statistic,
    to: TierId,
}

#[derive(Debug)]
struct Tier {
    name: String,
    ring: SampleRing,
    edges: Vec<Edge>,
}

/// Declares tiers and the statistic edges between them
#[derive(Debug, Default)]
pub struct CascadeBuilder {
    tiers: Vec<(String, usize)>,
    feeds: Vec<(TierId, Statistic, TierId)>,
}

impl CascadeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a tier of `size` slots
    pub fn tier(&mut self, name: impl Into<String>, size: usize) -> TierId {
        self.tiers.push((name.into(), size));
        TierId(self.tiers.len() - 1)
    }

    /// On every wrap of `from`, push its `statistic` into `to`
    pub fn feed(&mut self, from: TierId, statistic: Statistic, to: TierId) -> &mut Self {
        self.feeds.push((from, statistic, to));
        self
    }

    /// Validate the topology and build the cascade rooted at `root`.
    ///
    /// Every tier must be reachable from the root, each tier has at most one
    /// parent, a tier forwards each statistic at most once and the graph is
    /// acyclic.
    pub fn build(self, root: TierId) -> Result<Cascade> {
        let count = self.tiers.len();
        let known = |id: TierId| id.0 < count;

        if !known(root) {
            return Err(StationError::Cascade(format!("unknown root tier {}", root.0)));
        }

        let mut names = HashSet::new();
        for (name, size) in &self.tiers {
            if *size == 0 {
                return Err(StationError::Cascade(format!("tier '{}' has zero size", name)));
            }
            if !names.insert(name.as_str()) {
                return Err(StationError::Cascade(format!("duplicate tier name '{}'", name)));
            }
        }

        let mut parent: HashMap<TierId, TierId> = HashMap::new();
        let mut forwarded: HashSet<(TierId, Statistic)> = HashSet::new();
        let mut edges: Vec<Vec<Edge>> = vec![Vec::new(); count];

        for &(from, statistic, to) in &self.feeds {
            if !known(from) || !known(to) {
                return Err(StationError::Cascade(format!(
                    "edge {} -> {} references an unknown tier",
                    from.0, to.0
                )));
            }
            let from_name = &self.tiers[from.0].0;
            let to_name = &self.tiers[to.0].0;
            if from == to {
                return Err(StationError::Cascade(format!(
                    "tier '{}' cannot feed itself",
                    from_name
                )));
            }
            if !forwarded.insert((from, statistic)) {
                return Err(StationError::Cascade(format!(
                    "tier '{}' already forwards {:?}",
                    from_name, statistic
                )));
            }
            if let Some(existing) = parent.insert(to, from) {
                return Err(StationError::Cascade(format!(
                    "tier '{}' is fed by both '{}' and '{}'",
                    to_name, self.tiers[existing.0].0, from_name
                )));
            }
            edges[from.0].push(Edge { statistic, to });
        }

        if parent.contains_key(&root) {
            return Err(StationError::Cascade(format!(
                "root tier '{}' is fed by another tier",
                self.tiers[root.0].0
            )));
        }

        // With single parents, a cycle shows up as a tier whose parent chain
        // never terminates.
        for start in 0..count {
            let mut seen = HashSet::new();
            let mut current = TierId(start);
            while let Some(&up) = parent.get(&current) {
                if !seen.insert(current) {
                    return Err(StationError::Cascade(format!(
                        "cycle through tier '{}'",
                        self.tiers[start].0
                    )));
                }
                current = up;
            }
        }

        let mut reachable = vec![false; count];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if reachable[id.0] {
                continue;
            }
            reachable[id.0] = true;
            stack.extend(edges[id.0].iter().map(|e| e.to));
        }
        if let Some(orphan) = reachable.iter().position(|r| !r) {
            return Err(StationError::Cascade(format!(
                "tier '{}' is not reachable from the root",
                self.tiers[orphan].0
            )));
        }

        let tiers = self
            .tiers
            .into_iter()
            .zip(edges)
            .map(|((name, size), edges)| Tier {
                name,
                ring: SampleRing::new(size),
                edges,
            })
            .collect();

        Ok(Cascade { tiers, root })
    }
}

/// Validated tree of rings; writes enter at the root
#[derive(Debug)]
pub struct Cascade {
    tiers: Vec<Tier>,
    root: TierId,
}

impl Cascade {
    /// A cascade with a single ring and no edges
    pub fn single(size: usize) -> Self {
        Self {
            tiers: vec![Tier {
                name: "root".to_string(),
                ring: SampleRing::new(size),
                edges: Vec::new(),
            }],
            root: TierId(0),
        }
    }

    pub fn root(&self) -> TierId {
        self.root
    }

    /// Write into the root and propagate every completed window downstream.
    ///
    /// Returns the number of ring writes performed, the root write included.
    pub fn push(&mut self, value: f64) -> usize {
        let mut writes = 0;
        let mut pending = vec![(self.root, value)];

        while let Some((id, value)) = pending.pop() {
            let tier = &mut self.tiers[id.0];
            writes += 1;
            if tier.ring.push(value) {
                let stats = tier.ring.stats();
                // Reverse so edges are applied in declaration order.
                for edge in tier.edges.iter().rev() {
                    pending.push((edge.to, stats.get(edge.statistic)));
                }
            }
        }

        writes
    }

    /// Seed every root slot with `value`; nothing cascades
    pub fn fill_root(&mut self, value: f64) {
        self.tiers[self.root.0].ring.fill(value);
    }

    /// Add to the root's current slot without advancing or cascading
    pub fn add_to_current(&mut self, delta: f64) {
        self.tiers[self.root.0].ring.add_to_current(delta);
    }

    pub fn tier_id(&self, name: &str) -> Option<TierId> {
        self.tiers.iter().position(|t| t.name == name).map(TierId)
    }

    pub fn tier_name(&self, id: TierId) -> Option<&str> {
        self.tiers.get(id.0).map(|t| t.name.as_str())
    }

    pub fn ring(&self, id: TierId) -> Option<&SampleRing> {
        self.tiers.get(id.0).map(|t| &t.ring)
    }

    pub fn root_ring(&self) -> &SampleRing {
        &self.tiers[self.root.0].ring
    }

    pub fn tier_stats(&self, id: TierId) -> Option<Stats> {
        self.ring(id).map(SampleRing::stats)
    }

    pub fn tier_raw_data(&self, id: TierId) -> Option<RawData> {
        self.ring(id).map(SampleRing::raw_data)
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}
