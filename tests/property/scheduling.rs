use std::collections::{BTreeSet, HashMap};

use celldag::config::UserConfig;
use celldag::dag::DependencyGraph;
use celldag::engine::CoreRuntime;
use celldag::types::{UnitId, UnitStatus};
use celldag_test_utils::builders::{RequestSeq, completed, raised};
use proptest::prelude::*;

// Strategy for an acyclic notebook.
// Unit i may only read names defined by units 0..i, so every generated graph
// is a DAG; presentation order is shuffled separately.
fn notebook_strategy(max_units: usize) -> impl Strategy<Value = (Vec<Vec<usize>>, Vec<usize>)> {
    (1..=max_units).prop_flat_map(|n| {
        let deps = proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), n);
        let order = Just((0..n).collect::<Vec<usize>>()).prop_shuffle();
        (deps, order).prop_map(move |(raw, order)| {
            let deps = raw
                .into_iter()
                .enumerate()
                .map(|(i, candidates)| {
                    let set: BTreeSet<usize> = candidates
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|c| c % i.max(1))
                        .collect();
                    set.into_iter().collect()
                })
                .collect();
            (deps, order)
        })
    })
}

fn source(i: usize, deps: &[usize]) -> String {
    let mut expr = String::from("1");
    for d in deps {
        expr.push_str(&format!(" + v{d}"));
    }
    format!("v{i} = {expr}")
}

fn graph_for(deps: &[Vec<usize>], order: &[usize]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for &i in order {
        graph.insert(UnitId(i as u64), None);
    }
    for (i, ds) in deps.iter().enumerate() {
        graph.upsert(
            UnitId(i as u64),
            vec![format!("v{i}")],
            ds.iter().map(|d| format!("v{d}")).collect(),
        );
    }
    graph
}

proptest! {
    #[test]
    fn topological_order_respects_every_edge((deps, order) in notebook_strategy(12)) {
        let graph = graph_for(&deps, &order);
        let all: BTreeSet<UnitId> = graph.units().collect();

        let sorted = graph.topological_order(&all);
        prop_assert_eq!(sorted.len(), deps.len());
        prop_assert!(graph.cycle_check().is_empty());

        let rank: HashMap<UnitId, usize> =
            sorted.iter().enumerate().map(|(r, u)| (*u, r)).collect();
        for (i, ds) in deps.iter().enumerate() {
            for d in ds {
                prop_assert!(rank[&UnitId(*d as u64)] < rank[&UnitId(i as u64)]);
            }
        }

        // Same input, same order.
        prop_assert_eq!(graph.topological_order(&all), sorted);
    }

    #[test]
    fn edits_always_drain_in_dependency_order(
        (deps, _order) in notebook_strategy(10),
        edits in proptest::collection::vec(0..10usize, 1..6),
        failing in proptest::collection::vec(0..10usize, 0..3),
    ) {
        let mut core = CoreRuntime::new(UserConfig::default());
        let mut seq = RequestSeq::new();
        let n = deps.len();

        for (i, ds) in deps.iter().enumerate() {
            core.step(seq.create(i as u64, &source(i, ds)));
        }

        let failing: BTreeSet<UnitId> = failing
            .into_iter()
            .filter(|i| *i < n)
            .map(|i| UnitId(i as u64))
            .collect();

        for target in edits.into_iter().filter(|t| *t < n) {
            core.step(seq.edit(target as u64, &source(target, &deps[target])));

            let mut ran: Vec<UnitId> = Vec::new();
            let mut steps = 0;
            while let Some((unit, run_id)) = core.running() {
                steps += 1;
                prop_assert!(steps <= 1000, "scheduler did not drain");
                ran.push(unit);
                if failing.contains(&unit) {
                    core.step(raised(unit, run_id, "boom"));
                } else {
                    core.step(completed(unit, run_id, &[]));
                }
            }

            prop_assert!(core.is_idle());

            // Within one pass a unit never runs before a parent that also ran.
            let rank: HashMap<UnitId, usize> =
                ran.iter().enumerate().map(|(r, u)| (*u, r)).collect();
            for (i, ds) in deps.iter().enumerate() {
                let Some(child) = rank.get(&UnitId(i as u64)) else { continue };
                for d in ds {
                    if let Some(parent) = rank.get(&UnitId(*d as u64)) {
                        prop_assert!(parent < child);
                    }
                }
            }

            // Nothing downstream of a failure ran after it.
            for unit in &ran {
                if core.status_of(*unit) == Some(UnitStatus::Error) {
                    for child in core.graph().descendants(*unit) {
                        prop_assert_ne!(core.status_of(child), Some(UnitStatus::Idle));
                    }
                }
            }
        }
    }
}
