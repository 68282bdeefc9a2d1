// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! This module contains a synchronous, deterministic "core runtime" that
//! consumes [`RuntimeEvent`]s and produces:
//! - an updated core state (graph, unit records, execution queue)
//! - a list of "commands" describing what the IO shell should do next
//!
//! The async/IO-heavy shell (`engine::runtime::Runtime`) is responsible for:
//! - reading events from channels
//! - executing scheduled units and cancelling them
//! - applying publishes and status changes to the runtime environment
//!
//! The core is intended to be extensively unit tested without any Tokio,
//! channels or executors: tests feed it requests and fake completions.
//!
//! At most one unit runs at a time. A run that has been cancelled still
//! occupies the execution stream until it reports back, so two runs never
//! race to publish.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::config::UserConfig;
use crate::dag::{
    DependencyGraph, GraphSnapshot, ScheduledUnit, StatusChange, Structure, UnitInfo,
};
use crate::engine::event_handlers::{CoreCommand, CoreStep};
use crate::engine::{ControlRequest, RuntimeEvent};
use crate::errors::UnitError;
use crate::lang::SyntaxError;
use crate::types::{UnitId, UnitStatus};

/// The unit currently occupying the execution stream.
#[derive(Debug, Clone)]
pub(super) struct RunningUnit {
    pub(super) unit: UnitId,
    pub(super) run_id: u64,
    /// The result will be discarded when it arrives.
    pub(super) cancelled: bool,
    /// Status to assume after a discarded run if nothing else claims the unit.
    pub(super) settle: UnitStatus,
}

/// Pure core runtime state.
///
/// This owns:
/// - the dependency graph and the structural blockers derived from it
/// - per-unit records (source, program, status, error)
/// - the ordered execution queue of the current pass
/// - the active user configuration
///
/// It has **no** channels, no Tokio types, and does not perform any IO.
#[derive(Debug)]
pub struct CoreRuntime {
    pub(super) graph: DependencyGraph,
    pub(super) units: BTreeMap<UnitId, UnitInfo>,
    pub(super) structure: Structure,
    /// Units waiting to run, in topological order.
    pub(super) queue: Vec<UnitId>,
    pub(super) running: Option<RunningUnit>,
    pub(super) config: UserConfig,
    pub(super) graph_dirty: bool,
    next_run_id: u64,
    pass_id: u64,
    pass_active: bool,
}

impl CoreRuntime {
    pub fn new(config: UserConfig) -> Self {
        Self {
            graph: DependencyGraph::new(),
            units: BTreeMap::new(),
            structure: Structure::default(),
            queue: Vec::new(),
            running: None,
            config,
            graph_dirty: false,
            next_run_id: 1,
            pass_id: 0,
            pass_active: false,
        }
    }

    /// No unit running and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.running.is_none() && self.queue.is_empty()
    }

    pub fn status_of(&self, unit: UnitId) -> Option<UnitStatus> {
        self.units.get(&unit).map(|info| info.status)
    }

    pub fn error_of(&self, unit: UnitId) -> Option<&UnitError> {
        self.units.get(&unit).and_then(|info| info.error.as_ref())
    }

    /// Remaining execution queue (for tests and diagnostics).
    pub fn queued(&self) -> &[UnitId] {
        &self.queue
    }

    /// The in-flight run, if any, as `(unit, run_id)`.
    pub fn running(&self) -> Option<(UnitId, u64)> {
        self.running.as_ref().map(|r| (r.unit, r.run_id))
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn config(&self) -> &UserConfig {
        &self.config
    }

    /// A fresh graph snapshot if the topology changed since the last call.
    pub fn take_graph_snapshot(&mut self) -> Option<GraphSnapshot> {
        if !self.graph_dirty {
            return None;
        }
        self.graph_dirty = false;
        Some(self.graph.snapshot())
    }

    /// Handle a single runtime event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let mut commands = Vec::new();
        let mut keep_running = true;

        match event {
            RuntimeEvent::Request(envelope) => {
                debug!(seq = envelope.seq, request = ?envelope.request, "applying control request");
                match envelope.request {
                    ControlRequest::Create {
                        unit,
                        source,
                        index,
                        disabled,
                    } => self.handle_create(unit, source, index, disabled, &mut commands),
                    ControlRequest::Edit { unit, source } => {
                        self.handle_edit(unit, source, &mut commands)
                    }
                    ControlRequest::Delete { unit } => self.handle_delete(unit, &mut commands),
                    ControlRequest::SetDisabled { unit, disabled } => {
                        self.handle_set_disabled(unit, disabled, &mut commands)
                    }
                    ControlRequest::Run { units } => self.handle_run(units, &mut commands),
                    ControlRequest::RunStale => self.handle_run_stale(&mut commands),
                    ControlRequest::Interrupt(target) => {
                        self.handle_interrupt(target, &mut commands)
                    }
                    ControlRequest::SetUserConfig(config) => {
                        self.handle_set_config(config, &mut commands)
                    }
                    ControlRequest::Shutdown => {
                        self.handle_shutdown(&mut commands);
                        keep_running = false;
                    }
                }
            }
            RuntimeEvent::UnitFinished {
                unit,
                run_id,
                outcome,
            } => self.handle_finished(unit, run_id, outcome, &mut commands),
        }

        if keep_running {
            self.dispatch(&mut commands);
        }

        CoreStep {
            commands,
            keep_running,
        }
    }

    pub(super) fn is_runnable(&self, unit: UnitId) -> bool {
        self.units.contains_key(&unit) && !self.structure.is_blocked(unit)
    }

    /// Record a status transition; emits a command only on change.
    pub(super) fn set_status(
        &mut self,
        unit: UnitId,
        status: UnitStatus,
        error: Option<UnitError>,
        out: &mut Vec<CoreCommand>,
    ) {
        let Some(info) = self.units.get_mut(&unit) else {
            return;
        };
        if info.status == status && info.error == error {
            return;
        }
        debug!(%unit, from = %info.status, to = %status, "status change");
        info.status = status;
        info.error = error.clone();
        out.push(CoreCommand::SetStatus(StatusChange {
            unit,
            status,
            error,
        }));
    }

    /// Cancel the in-flight run of `unit`, if it is the one running.
    pub(super) fn cancel_if_running(
        &mut self,
        unit: UnitId,
        settle: UnitStatus,
        out: &mut Vec<CoreCommand>,
    ) {
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if running.unit != unit {
            return;
        }
        running.settle = settle;
        if running.cancelled {
            return;
        }
        running.cancelled = true;
        info!(%unit, run_id = running.run_id, "cancelling in-flight run");
        out.push(CoreCommand::Cancel {
            unit,
            run_id: running.run_id,
        });
    }

    /// Re-derive structural blockers and apply the resulting transitions.
    ///
    /// Newly blocked units leave the queue (and are cancelled if running).
    /// Returns units that were blocked before and are runnable now.
    pub(super) fn refresh_structure(&mut self, out: &mut Vec<CoreCommand>) -> BTreeSet<UnitId> {
        let syntax_errors: BTreeMap<UnitId, SyntaxError> = self
            .units
            .values()
            .filter_map(|info| info.syntax_error.clone().map(|e| (info.id, e)))
            .collect();

        let next = Structure::derive(&self.graph, &syntax_errors);
        let mut recovered = self.structure.recovered_in(&next);
        recovered.retain(|u| self.units.contains_key(u));

        let blocked: Vec<(UnitId, UnitStatus, Option<UnitError>)> = next
            .iter()
            .map(|(unit, blocker)| (unit, blocker.status(), blocker.error()))
            .collect();
        self.structure = next;

        for (unit, status, error) in blocked {
            self.queue.retain(|u| *u != unit);
            self.cancel_if_running(unit, status, out);
            self.set_status(unit, status, error, out);
        }

        if !recovered.is_empty() {
            info!(?recovered, "units recovered from structural block");
        }
        recovered
    }

    /// Merge `roots` (plus descendants when `expand`) into the execution
    /// queue, re-ordering it topologically.
    ///
    /// A running unit that is part of the merged set is cancelled and
    /// queued again; its current result will be discarded.
    pub(super) fn schedule(
        &mut self,
        roots: BTreeSet<UnitId>,
        expand: bool,
        out: &mut Vec<CoreCommand>,
    ) {
        let mut affected: BTreeSet<UnitId> = BTreeSet::new();
        for root in roots {
            if !self.is_runnable(root) {
                debug!(unit = %root, "not runnable; skipped");
                continue;
            }
            affected.insert(root);
            if expand {
                affected.extend(
                    self.graph
                        .descendants(root)
                        .into_iter()
                        .filter(|u| self.is_runnable(*u)),
                );
            }
        }

        if affected.is_empty() {
            return;
        }

        if !self.pass_active {
            self.pass_active = true;
            self.pass_id += 1;
            info!(pass_id = self.pass_id, units = affected.len(), "starting pass");
        }

        let running = self.running.as_ref().map(|r| r.unit);
        if let Some(unit) = running.filter(|u| affected.contains(u)) {
            self.cancel_if_running(unit, UnitStatus::Queued, out);
        }

        let mut merged: BTreeSet<UnitId> = self.queue.iter().copied().collect();
        merged.extend(affected.iter().copied());
        self.queue = self.graph.topological_order(&merged);

        debug!(pass_id = self.pass_id, queue = ?self.queue, "execution queue updated");

        for unit in affected {
            if Some(unit) != running {
                self.set_status(unit, UnitStatus::Queued, None, out);
            }
        }
    }

    /// Mark runnable units stale unless they are already queued.
    ///
    /// A running member is cancelled and settles as stale.
    pub(super) fn mark_stale(&mut self, units: BTreeSet<UnitId>, out: &mut Vec<CoreCommand>) {
        for unit in units {
            if !self.is_runnable(unit) || self.queue.contains(&unit) {
                continue;
            }
            if self.running.as_ref().is_some_and(|r| r.unit == unit) {
                self.cancel_if_running(unit, UnitStatus::Stale, out);
                continue;
            }
            self.set_status(unit, UnitStatus::Stale, None, out);
        }
    }

    /// Start the next queued unit if the execution stream is free.
    pub(super) fn dispatch(&mut self, out: &mut Vec<CoreCommand>) {
        if self.running.is_some() {
            return;
        }

        while !self.queue.is_empty() {
            let unit = self.queue.remove(0);
            if !self.is_runnable(unit) {
                continue;
            }
            let Some(info) = self.units.get(&unit) else {
                continue;
            };
            let Some(program) = info.program.clone() else {
                continue;
            };

            let run_id = self.next_run_id;
            self.next_run_id += 1;

            let scheduled = ScheduledUnit {
                unit,
                run_id,
                pass_id: self.pass_id,
                program,
                refs: self.graph.refs_of(unit).cloned().unwrap_or_default(),
                defs: self.graph.defs_of(unit).to_vec(),
            };

            info!(%unit, run_id, pass_id = self.pass_id, "starting unit");
            self.set_status(unit, UnitStatus::Running, None, out);
            self.running = Some(RunningUnit {
                unit,
                run_id,
                cancelled: false,
                settle: UnitStatus::Idle,
            });
            out.push(CoreCommand::Start(scheduled));
            return;
        }

        if self.pass_active {
            self.pass_active = false;
            info!(pass_id = self.pass_id, "pass finished");
            out.push(CoreCommand::PassFinished {
                pass_id: self.pass_id,
            });
        }
    }
}
