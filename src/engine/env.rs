// src/engine/env.rs

//! Runtime environment: published bindings, unit outputs and statuses.
//!
//! The runtime task is the only writer. Every mutation happens under a single
//! write lock, so a reader either sees a unit's bindings, output and status
//! from before a publish or all of them from after it. Readers copy what they
//! need and never hold the lock across an await.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;

use crate::errors::UnitError;
use crate::lang::Value;
use crate::types::{UnitId, UnitStatus};

/// Result of looking up a name or a unit output.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Bound(Value),
    Unbound,
}

impl Lookup {
    pub fn bound(self) -> Option<Value> {
        match self {
            Lookup::Bound(v) => Some(v),
            Lookup::Unbound => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitState {
    pub status: UnitStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UnitError>,
}

#[derive(Debug, Default)]
struct EnvTables {
    /// name -> (owning unit, value)
    values: HashMap<String, (UnitId, Value)>,
    outputs: HashMap<UnitId, Value>,
    states: BTreeMap<UnitId, UnitState>,
}

/// Shared handle to the runtime environment.
#[derive(Debug, Clone, Default)]
pub struct Env {
    tables: Arc<RwLock<EnvTables>>,
}

impl Env {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EnvTables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EnvTables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current value of a defined name.
    pub fn get(&self, name: &str) -> Lookup {
        match self.read().values.get(name) {
            Some((_, value)) => Lookup::Bound(value.clone()),
            None => Lookup::Unbound,
        }
    }

    /// Last published output of a unit.
    pub fn output(&self, unit: UnitId) -> Lookup {
        match self.read().outputs.get(&unit) {
            Some(value) => Lookup::Bound(value.clone()),
            None => Lookup::Unbound,
        }
    }

    pub fn state(&self, unit: UnitId) -> Option<UnitState> {
        self.read().states.get(&unit).cloned()
    }

    pub fn status(&self, unit: UnitId) -> Option<UnitStatus> {
        self.read().states.get(&unit).map(|s| s.status)
    }

    /// Values for `names`, skipping unbound ones.
    pub fn inputs<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> HashMap<String, Value> {
        let tables = self.read();
        names
            .into_iter()
            .filter_map(|name| {
                tables
                    .values
                    .get(name)
                    .map(|(_, value)| (name.clone(), value.clone()))
            })
            .collect()
    }

    /// Publish a completed run: replace the unit's bindings, set its output
    /// and mark it idle, atomically.
    pub fn set_many(&self, unit: UnitId, bindings: Vec<(String, Value)>, output: Value) {
        let mut tables = self.write();
        tables
            .values
            .retain(|name, (owner, _)| *owner != unit || bindings.iter().any(|(n, _)| n == name));
        for (name, value) in bindings {
            tables.values.insert(name, (unit, value));
        }
        tables.outputs.insert(unit, output);
        tables.states.insert(
            unit,
            UnitState {
                status: UnitStatus::Idle,
                error: None,
            },
        );
    }

    pub fn set_state(&self, unit: UnitId, status: UnitStatus, error: Option<UnitError>) {
        self.write()
            .states
            .insert(unit, UnitState { status, error });
    }

    /// Remove `names` if `unit` is still the one that bound them.
    pub fn retract(&self, unit: UnitId, names: &[String]) {
        let mut tables = self.write();
        for name in names {
            if tables.values.get(name).is_some_and(|(owner, _)| *owner == unit) {
                tables.values.remove(name);
            }
        }
    }

    pub fn forget(&self, unit: UnitId) {
        let mut tables = self.write();
        tables.values.retain(|_, (owner, _)| *owner != unit);
        tables.outputs.remove(&unit);
        tables.states.remove(&unit);
    }

    /// Point-in-time copy of all tables.
    pub fn snapshot(&self) -> EnvSnapshot {
        let tables = self.read();
        EnvSnapshot {
            values: tables
                .values
                .iter()
                .map(|(name, (owner, value))| {
                    (
                        name.clone(),
                        BoundValue {
                            unit: *owner,
                            value: value.clone(),
                        },
                    )
                })
                .collect(),
            outputs: tables
                .outputs
                .iter()
                .map(|(unit, value)| (*unit, value.clone()))
                .collect(),
            units: tables.states.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundValue {
    pub unit: UnitId,
    pub value: Value,
}

/// Read-only copy of the runtime environment, e.g. for static export.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EnvSnapshot {
    pub values: BTreeMap<String, BoundValue>,
    pub outputs: BTreeMap<UnitId, Value>,
    pub units: BTreeMap<UnitId, UnitState>,
}
