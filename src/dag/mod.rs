// src/dag/mod.rs

//! Dependency graph and structural analysis.
//!
//! - [`graph`] holds the unit graph: name table, derived edges, cycle and
//!   conflict detection, deterministic topological ordering.
//! - [`structure`] turns graph conflicts, cycles and unresolved references
//!   into per-unit blockers.
//! - [`unit_info`] provides per-unit records and the scheduled unit type.

pub mod graph;
pub mod structure;
pub mod unit_info;

pub use graph::{DependencyGraph, EdgeView, GraphSnapshot, UnitView};
pub use structure::{Blocker, Structure};
pub use unit_info::{ScheduledUnit, StatusChange, UnitInfo};
