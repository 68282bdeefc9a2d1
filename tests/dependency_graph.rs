// tests/dependency_graph.rs

use std::collections::{BTreeMap, BTreeSet};

use celldag::dag::{Blocker, DependencyGraph, Structure};
use celldag::errors::UnitError;
use celldag::types::{UnitId, UnitStatus};

fn u(id: u64) -> UnitId {
    UnitId(id)
}

fn add(graph: &mut DependencyGraph, id: u64, defs: &[&str], refs: &[&str]) {
    graph.upsert(
        u(id),
        defs.iter().map(|s| s.to_string()).collect(),
        refs.iter().map(|s| s.to_string()).collect(),
    );
}

fn all(graph: &DependencyGraph) -> BTreeSet<UnitId> {
    graph.units().collect()
}

#[test]
fn edges_follow_definitions_and_references() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["x"], &[]);
    add(&mut graph, 2, &["y"], &["x"]);
    add(&mut graph, 3, &[], &["x", "y"]);

    assert_eq!(graph.children_of(u(1)).len(), 2);
    assert_eq!(graph.parents_of(u(3)).len(), 2);
    assert_eq!(graph.descendants(u(1)), BTreeSet::from([u(2), u(3)]));

    let snapshot = graph.snapshot();
    assert_eq!(snapshot.units.len(), 3);
    let edge = snapshot
        .edges
        .iter()
        .find(|e| e.from == u(2) && e.to == u(3))
        .unwrap();
    assert_eq!(edge.names, vec!["y".to_string()]);
}

#[test]
fn definer_added_later_gains_its_readers() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &[], &["x"]);
    assert_eq!(graph.unresolved_refs(u(1)), vec!["x".to_string()]);

    add(&mut graph, 2, &["x"], &[]);
    assert!(graph.unresolved_refs(u(1)).is_empty());
    assert_eq!(graph.children_of(u(2)), vec![u(1)]);
}

#[test]
fn topological_order_breaks_ties_by_position() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["x"], &[]);
    add(&mut graph, 2, &["a"], &["x"]);
    add(&mut graph, 3, &["b"], &["x"]);
    add(&mut graph, 4, &["c"], &["a", "b"]);

    assert_eq!(graph.topological_order(&all(&graph)), vec![u(1), u(2), u(3), u(4)]);

    // Moving 3 in front of 2 swaps the siblings, not the dependencies.
    let mut moved = DependencyGraph::new();
    moved.insert(u(1), None);
    moved.insert(u(3), None);
    moved.insert(u(2), None);
    moved.insert(u(4), None);
    add(&mut moved, 1, &["x"], &[]);
    add(&mut moved, 2, &["a"], &["x"]);
    add(&mut moved, 3, &["b"], &["x"]);
    add(&mut moved, 4, &["c"], &["a", "b"]);
    assert_eq!(moved.topological_order(&all(&moved)), vec![u(1), u(3), u(2), u(4)]);
}

#[test]
fn dependencies_win_over_presentation_order() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["y"], &["x"]);
    add(&mut graph, 2, &["x"], &[]);

    assert_eq!(graph.topological_order(&all(&graph)), vec![u(2), u(1)]);
}

#[test]
fn cycles_are_reported_sorted() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["a"], &["b"]);
    add(&mut graph, 2, &["b"], &["a"]);
    add(&mut graph, 3, &["c"], &["a"]);

    assert_eq!(graph.cycle_check(), vec![vec![u(1), u(2)]]);

    add(&mut graph, 2, &["b"], &[]);
    assert!(graph.cycle_check().is_empty());
}

#[test]
fn disabled_units_do_not_define_names() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["x"], &[]);
    add(&mut graph, 2, &["x"], &[]);
    add(&mut graph, 3, &[], &["x"]);

    assert_eq!(graph.conflicts(), vec![("x".to_string(), vec![u(1), u(2)])]);

    graph.set_disabled(u(2), true);
    assert!(graph.conflicts().is_empty());
    assert_eq!(graph.definers_of("x"), vec![u(1)]);
    assert_eq!(graph.parents_of(u(3)), vec![u(1)]);

    graph.set_disabled(u(2), false);
    assert_eq!(graph.conflicts().len(), 1);
}

#[test]
fn removing_a_definer_orphans_its_readers() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["x"], &[]);
    add(&mut graph, 2, &[], &["x"]);

    let orphaned = graph.remove(u(1));
    assert_eq!(orphaned, BTreeSet::from([u(2)]));
    assert!(!graph.contains(u(1)));
    assert_eq!(graph.unresolved_refs(u(2)), vec!["x".to_string()]);
}

#[test]
fn structure_blocks_conflicts_and_their_descendants() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["x"], &[]);
    add(&mut graph, 2, &["x"], &[]);
    add(&mut graph, 3, &["y"], &["x"]);
    add(&mut graph, 4, &["z"], &[]);

    let structure = Structure::derive(&graph, &BTreeMap::new());
    for id in [1, 2, 3] {
        let blocker = structure.blocker(u(id)).unwrap();
        assert_eq!(blocker.status(), UnitStatus::Error);
        assert!(matches!(
            blocker.error(),
            Some(UnitError::MultipleDefinition { ref name, ref units })
                if name == "x" && units == &vec![u(1), u(2)]
        ));
    }
    assert!(!structure.is_blocked(u(4)));

    graph.set_disabled(u(2), true);
    let next = Structure::derive(&graph, &BTreeMap::new());
    assert_eq!(next.blocker(u(2)), Some(&Blocker::Disabled));
    assert_eq!(structure.recovered_in(&next), BTreeSet::from([u(1), u(3)]));
}

#[test]
fn structure_marks_unresolved_and_downstream_stale() {
    let mut graph = DependencyGraph::new();
    add(&mut graph, 1, &["y"], &["missing"]);
    add(&mut graph, 2, &["z"], &["y"]);

    let structure = Structure::derive(&graph, &BTreeMap::new());
    assert_eq!(
        structure.blocker(u(1)),
        Some(&Blocker::Unresolved(vec!["missing".to_string()]))
    );
    assert_eq!(structure.blocker(u(2)), Some(&Blocker::Upstream));
    assert_eq!(structure.blocker(u(2)).unwrap().status(), UnitStatus::Stale);
}
