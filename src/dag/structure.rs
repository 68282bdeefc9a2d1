// src/dag/structure.rs

//! Structural blockers derived from the dependency graph.
//!
//! A unit is *blocked* when it may not be scheduled: it is disabled, its
//! source does not parse, it takes part in a name conflict or a cycle, or it
//! sits downstream of one of those. Everything not blocked is runnable.
//!
//! The derivation is a pure function of the graph plus the set of units with
//! a pending syntax error, so it can be recomputed after every topology change
//! and diffed against the previous result.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::dag::graph::DependencyGraph;
use crate::errors::UnitError;
use crate::lang::SyntaxError;
use crate::types::{UnitId, UnitStatus};

/// Why a unit cannot be scheduled right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
    Disabled,
    Syntax(SyntaxError),
    /// Definer of a conflicting name, or a descendant of one.
    Conflict(UnitError),
    /// Member of a dependency cycle.
    Cycle(UnitError),
    /// Reads names that no live unit defines.
    Unresolved(Vec<String>),
    /// Downstream of a cycle or an unresolved reference.
    Upstream,
}

impl Blocker {
    pub fn status(&self) -> UnitStatus {
        match self {
            Blocker::Disabled => UnitStatus::Disabled,
            Blocker::Syntax(_) | Blocker::Conflict(_) | Blocker::Cycle(_) => UnitStatus::Error,
            Blocker::Unresolved(_) | Blocker::Upstream => UnitStatus::Stale,
        }
    }

    pub fn error(&self) -> Option<UnitError> {
        match self {
            Blocker::Disabled | Blocker::Upstream => None,
            Blocker::Syntax(e) => Some(UnitError::Syntax(e.clone())),
            Blocker::Conflict(e) | Blocker::Cycle(e) => Some(e.clone()),
            Blocker::Unresolved(names) => Some(UnitError::UnresolvedReference {
                names: names.clone(),
            }),
        }
    }
}

/// Blockers for every currently blocked unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Structure {
    blockers: BTreeMap<UnitId, Blocker>,
}

impl Structure {
    /// Derive blockers from `graph`.
    ///
    /// Precedence per unit: disabled, syntax error, conflict (own or
    /// inherited), cycle membership, unresolved reference, upstream block.
    /// A syntax error blocks only its own unit; its previous definitions keep
    /// feeding downstream units.
    pub fn derive(
        graph: &DependencyGraph,
        syntax_errors: &BTreeMap<UnitId, SyntaxError>,
    ) -> Self {
        let mut blockers: BTreeMap<UnitId, Blocker> = BTreeMap::new();

        for unit in graph.units() {
            if graph.is_disabled(unit) {
                blockers.insert(unit, Blocker::Disabled);
            } else if let Some(err) = syntax_errors.get(&unit) {
                blockers.insert(unit, Blocker::Syntax(err.clone()));
            }
        }

        // Conflicts poison the definers and everything downstream of them.
        for (name, units) in graph.conflicts() {
            let error = UnitError::MultipleDefinition {
                name,
                units: units.clone(),
            };
            for definer in &units {
                let mut reach = graph.descendants(*definer);
                reach.insert(*definer);
                for unit in reach {
                    blockers
                        .entry(unit)
                        .or_insert_with(|| Blocker::Conflict(error.clone()));
                }
            }
        }

        let mut upstream_roots: BTreeSet<UnitId> = BTreeSet::new();

        for cycle in graph.cycle_check() {
            let error = UnitError::Cycle {
                units: cycle.clone(),
            };
            for unit in &cycle {
                blockers
                    .entry(*unit)
                    .or_insert_with(|| Blocker::Cycle(error.clone()));
                upstream_roots.insert(*unit);
            }
        }

        for unit in graph.units() {
            let missing = graph.unresolved_refs(unit);
            if missing.is_empty() {
                continue;
            }
            blockers
                .entry(unit)
                .or_insert_with(|| Blocker::Unresolved(missing));
            upstream_roots.insert(unit);
        }

        for root in upstream_roots {
            if !matches!(
                blockers.get(&root),
                Some(Blocker::Cycle(_) | Blocker::Unresolved(_))
            ) {
                continue;
            }
            for unit in graph.descendants(root) {
                blockers.entry(unit).or_insert(Blocker::Upstream);
            }
        }

        debug!(blocked = blockers.len(), "structure derived");
        Self { blockers }
    }

    pub fn blocker(&self, unit: UnitId) -> Option<&Blocker> {
        self.blockers.get(&unit)
    }

    pub fn is_blocked(&self, unit: UnitId) -> bool {
        self.blockers.contains_key(&unit)
    }

    /// Units blocked here but not in `next`.
    pub fn recovered_in(&self, next: &Structure) -> BTreeSet<UnitId> {
        self.blockers
            .keys()
            .filter(|unit| !next.blockers.contains_key(unit))
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (UnitId, &Blocker)> + '_ {
        self.blockers.iter().map(|(u, b)| (*u, b))
    }
}
