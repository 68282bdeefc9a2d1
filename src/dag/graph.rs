// src/dag/graph.rs

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet};

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;
use tracing::{debug, trace};

use crate::types::UnitId;

/// Internal node record: what the unit defines and reads.
#[derive(Debug, Clone, Default)]
struct UnitNode {
    defs: Vec<String>,
    refs: BTreeSet<String>,
    disabled: bool,
}

/// Dependency graph over units.
///
/// Nodes are keyed by [`UnitId`]; an edge `B -> A` exists iff `A` references
/// a name that the non-disabled unit `B` defines. Edges are derived from the
/// def/ref sets and recomputed on every change; they are never set directly.
///
/// The graph itself never rejects a topology: conflicts and cycles are
/// reported by [`DependencyGraph::conflicts`] and
/// [`DependencyGraph::cycle_check`] and turned into unit errors by
/// `dag::structure`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<UnitId, UnitNode>,
    /// Presentation order; the index is the unit's position.
    order: Vec<UnitId>,
    /// Name table: defined name -> non-disabled units defining it.
    definers: HashMap<String, BTreeSet<UnitId>>,
    edges: DiGraphMap<UnitId, ()>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, unit: UnitId) -> bool {
        self.nodes.contains_key(&unit)
    }

    /// Units in presentation order.
    pub fn units(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.order.iter().copied()
    }

    /// Add an empty unit at `index` (or at the end).
    pub fn insert(&mut self, unit: UnitId, index: Option<usize>) {
        if self.nodes.contains_key(&unit) {
            return;
        }
        let index = index.unwrap_or(self.order.len()).min(self.order.len());
        self.order.insert(index, unit);
        self.nodes.insert(unit, UnitNode::default());
        self.edges.add_node(unit);
        debug!(%unit, position = index, "graph: inserted unit");
    }

    /// Replace a unit's def/ref sets and recompute its incident edges.
    pub fn upsert(&mut self, unit: UnitId, defs: Vec<String>, refs: BTreeSet<String>) {
        if !self.nodes.contains_key(&unit) {
            self.insert(unit, None);
        }

        let disabled = self.nodes.get(&unit).is_some_and(|n| n.disabled);
        self.unregister_defs(unit);

        if let Some(node) = self.nodes.get_mut(&unit) {
            node.defs = defs;
            node.refs = refs;
        }

        if !disabled {
            self.register_defs(unit);
        }
        self.rebuild_incident_edges(unit);

        trace!(
            %unit,
            defs = ?self.defs_of(unit),
            refs = ?self.refs_of(unit),
            "graph: upserted unit"
        );
    }

    /// Delete a unit and its name bindings.
    ///
    /// Returns the units that referenced one of the removed names.
    pub fn remove(&mut self, unit: UnitId) -> BTreeSet<UnitId> {
        let Some(node) = self.nodes.get(&unit) else {
            return BTreeSet::new();
        };
        let removed_names: Vec<String> = node.defs.clone();

        self.unregister_defs(unit);
        self.nodes.remove(&unit);
        self.order.retain(|u| *u != unit);
        self.edges.remove_node(unit);

        let orphaned = self.referencing_any(&removed_names);
        debug!(%unit, ?orphaned, "graph: removed unit");
        orphaned
    }

    /// Exclude (or re-include) a unit's definitions from the name table.
    pub fn set_disabled(&mut self, unit: UnitId, disabled: bool) {
        let Some(node) = self.nodes.get_mut(&unit) else {
            return;
        };
        if node.disabled == disabled {
            return;
        }
        node.disabled = disabled;

        if disabled {
            self.unregister_defs(unit);
        } else {
            self.register_defs(unit);
        }

        // Units reading our names gain or lose their edge from us.
        let names = self.defs_of(unit).to_vec();
        self.rebuild_incident_edges(unit);
        for reader in self.referencing_any(&names) {
            self.rebuild_incident_edges(reader);
        }
    }

    pub fn is_disabled(&self, unit: UnitId) -> bool {
        self.nodes.get(&unit).is_some_and(|n| n.disabled)
    }

    pub fn defs_of(&self, unit: UnitId) -> &[String] {
        self.nodes
            .get(&unit)
            .map(|n| n.defs.as_slice())
            .unwrap_or(&[])
    }

    pub fn refs_of(&self, unit: UnitId) -> Option<&BTreeSet<String>> {
        self.nodes.get(&unit).map(|n| &n.refs)
    }

    /// Non-disabled units currently defining `name`.
    pub fn definers_of(&self, name: &str) -> Vec<UnitId> {
        self.definers
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// References of `unit` that no live unit defines.
    pub fn unresolved_refs(&self, unit: UnitId) -> Vec<String> {
        let Some(node) = self.nodes.get(&unit) else {
            return Vec::new();
        };
        node.refs
            .iter()
            .filter(|name| self.definers.get(*name).is_none_or(|set| set.is_empty()))
            .cloned()
            .collect()
    }

    /// Immediate parents (units this one reads from).
    pub fn parents_of(&self, unit: UnitId) -> Vec<UnitId> {
        if !self.edges.contains_node(unit) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(unit, Direction::Incoming)
            .collect()
    }

    /// Immediate children (units reading from this one).
    pub fn children_of(&self, unit: UnitId) -> Vec<UnitId> {
        if !self.edges.contains_node(unit) {
            return Vec::new();
        }
        self.edges
            .neighbors_directed(unit, Direction::Outgoing)
            .collect()
    }

    /// All units transitively reachable from `unit` along dependency edges.
    ///
    /// `unit` itself is only included when it lies on a cycle.
    pub fn descendants(&self, unit: UnitId) -> BTreeSet<UnitId> {
        let mut seen = BTreeSet::new();
        let mut stack = self.children_of(unit);

        while let Some(next) = stack.pop() {
            if seen.insert(next) {
                stack.extend(self.children_of(next));
            }
        }

        seen
    }

    /// Names defined by more than one non-disabled unit.
    pub fn conflicts(&self) -> Vec<(String, Vec<UnitId>)> {
        let mut conflicts: Vec<(String, Vec<UnitId>)> = self
            .definers
            .iter()
            .filter(|(_, units)| units.len() > 1)
            .map(|(name, units)| (name.clone(), units.iter().copied().collect()))
            .collect();
        conflicts.sort();
        conflicts
    }

    /// Strongly connected components that form cycles (including self-loops),
    /// each sorted by unit id.
    pub fn cycle_check(&self) -> Vec<Vec<UnitId>> {
        let mut cycles: Vec<Vec<UnitId>> = tarjan_scc(&self.edges)
            .into_iter()
            .filter(|scc| {
                scc.len() > 1 || scc.iter().any(|u| self.edges.contains_edge(*u, *u))
            })
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Order `units` topologically; ready units are taken in ascending
    /// presentation position.
    ///
    /// Only edges between members of `units` are considered. Members that sit
    /// on a cycle are appended last in position order.
    pub fn topological_order(&self, units: &BTreeSet<UnitId>) -> Vec<UnitId> {
        let mut in_degree: HashMap<UnitId, usize> = units.iter().map(|u| (*u, 0)).collect();
        for &unit in units {
            for child in self.children_of(unit) {
                if child != unit {
                    if let Some(d) = in_degree.get_mut(&child) {
                        *d += 1;
                    }
                }
            }
        }

        let position: HashMap<UnitId, usize> = self
            .order
            .iter()
            .enumerate()
            .map(|(i, u)| (*u, i))
            .collect();
        let key = |u: UnitId| (position.get(&u).copied().unwrap_or(usize::MAX), u);

        let mut ready: BinaryHeap<Reverse<(usize, UnitId)>> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(u, _)| Reverse(key(*u)))
            .collect();

        let mut ordered = Vec::with_capacity(units.len());
        let mut emitted: HashSet<UnitId> = HashSet::new();

        while let Some(Reverse((_, unit))) = ready.pop() {
            ordered.push(unit);
            emitted.insert(unit);
            for child in self.children_of(unit) {
                if child == unit {
                    continue;
                }
                if let Some(d) = in_degree.get_mut(&child) {
                    *d -= 1;
                    if *d == 0 {
                        ready.push(Reverse(key(child)));
                    }
                }
            }
        }

        if ordered.len() < units.len() {
            let mut rest: Vec<UnitId> = units
                .iter()
                .copied()
                .filter(|u| !emitted.contains(u))
                .collect();
            rest.sort_by_key(|u| key(*u));
            ordered.extend(rest);
        }

        ordered
    }

    /// Read-only copy for visualisation.
    pub fn snapshot(&self) -> GraphSnapshot {
        let units = self
            .order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                self.nodes.get(id).map(|node| UnitView {
                    id: *id,
                    position,
                    defs: node.defs.clone(),
                    refs: node.refs.iter().cloned().collect(),
                    disabled: node.disabled,
                })
            })
            .collect();

        let mut edges: Vec<EdgeView> = self
            .edges
            .all_edges()
            .map(|(from, to, _)| {
                let names = self
                    .refs_of(to)
                    .map(|refs| {
                        self.defs_of(from)
                            .iter()
                            .filter(|d| refs.contains(*d))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                EdgeView { from, to, names }
            })
            .collect();
        edges.sort_by_key(|e| (e.from, e.to));

        GraphSnapshot { units, edges }
    }

    fn register_defs(&mut self, unit: UnitId) {
        let defs = self.defs_of(unit).to_vec();
        for name in defs {
            self.definers.entry(name).or_default().insert(unit);
        }
    }

    fn unregister_defs(&mut self, unit: UnitId) {
        let defs = self.defs_of(unit).to_vec();
        for name in defs {
            if let Some(set) = self.definers.get_mut(&name) {
                set.remove(&unit);
                if set.is_empty() {
                    self.definers.remove(&name);
                }
            }
        }
    }

    /// Units whose refs mention any of `names`.
    fn referencing_any(&self, names: &[String]) -> BTreeSet<UnitId> {
        self.nodes
            .iter()
            .filter(|(_, node)| names.iter().any(|n| node.refs.contains(n)))
            .map(|(id, _)| *id)
            .collect()
    }

    /// Drop and re-derive every edge touching `unit`.
    fn rebuild_incident_edges(&mut self, unit: UnitId) {
        let incident: Vec<(UnitId, UnitId)> = self
            .edges
            .edges_directed(unit, Direction::Incoming)
            .map(|(a, b, _)| (a, b))
            .chain(
                self.edges
                    .edges_directed(unit, Direction::Outgoing)
                    .map(|(a, b, _)| (a, b)),
            )
            .collect();
        for (a, b) in incident {
            self.edges.remove_edge(a, b);
        }

        let Some(node) = self.nodes.get(&unit) else {
            return;
        };

        // Incoming: definers of what we read.
        let mut new_edges: Vec<(UnitId, UnitId)> = Vec::new();
        for name in &node.refs {
            if let Some(definers) = self.definers.get(name) {
                new_edges.extend(definers.iter().map(|d| (*d, unit)));
            }
        }

        // Outgoing: readers of what we define (only while enabled).
        if !node.disabled {
            for (other, other_node) in &self.nodes {
                if node.defs.iter().any(|d| other_node.refs.contains(d)) {
                    new_edges.push((unit, *other));
                }
            }
        }

        for (a, b) in new_edges {
            self.edges.add_edge(a, b, ());
        }
    }
}

/// One unit as seen in a [`GraphSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitView {
    pub id: UnitId,
    pub position: usize,
    pub defs: Vec<String>,
    pub refs: Vec<String>,
    pub disabled: bool,
}

/// One dependency edge with the names that induce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeView {
    pub from: UnitId,
    pub to: UnitId,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GraphSnapshot {
    pub units: Vec<UnitView>,
    pub edges: Vec<EdgeView>,
}
