// src/dag/unit_info.rs

//! Per-unit records kept by the scheduler core.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::errors::UnitError;
use crate::lang::{Program, SyntaxError};
use crate::types::{UnitId, UnitStatus};

/// Everything the core knows about one unit.
#[derive(Debug, Clone)]
pub struct UnitInfo {
    pub id: UnitId,
    /// Program of the last source that analysed cleanly.
    pub program: Option<Arc<Program>>,
    /// Set while `source` does not parse; cleared by the next good edit.
    pub syntax_error: Option<SyntaxError>,
    pub status: UnitStatus,
    pub error: Option<UnitError>,
}

impl UnitInfo {
    pub fn new(id: UnitId) -> Self {
        Self {
            id,
            program: None,
            syntax_error: None,
            status: UnitStatus::Idle,
            error: None,
        }
    }
}

/// A unit the core wants the shell to execute now.
#[derive(Debug, Clone)]
pub struct ScheduledUnit {
    pub unit: UnitId,
    /// Monotonic run identifier; completions carrying an older id are stale.
    pub run_id: u64,
    /// Scheduling pass this run belongs to.
    pub pass_id: u64,
    pub program: Arc<Program>,
    /// Names the unit reads; their current values become its inputs.
    pub refs: BTreeSet<String>,
    pub defs: Vec<String>,
}

/// A status transition observed by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub unit: UnitId,
    pub status: UnitStatus,
    pub error: Option<UnitError>,
}
