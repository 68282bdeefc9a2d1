// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! Each handler mutates the core state and appends the commands the IO shell
//! must carry out, in order. Handlers never start a unit directly: the caller
//! runs [`CoreRuntime::dispatch`] once the request has been fully applied.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::analyze::analyze;
use crate::config::UserConfig;
use crate::dag::{ScheduledUnit, StatusChange, UnitInfo};
use crate::engine::core::CoreRuntime;
use crate::errors::UnitError;
use crate::exec::UnitOutcome;
use crate::lang::Value;
use crate::types::{InterruptTarget, OnCellChange, UnitId, UnitStatus};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Execute this unit now.
    Start(ScheduledUnit),
    /// Ask the in-flight run to stop at its next suspension point.
    Cancel { unit: UnitId, run_id: u64 },
    SetStatus(StatusChange),
    /// Make a completed run's bindings visible and mark the unit idle, as one
    /// atomic step.
    Publish {
        unit: UnitId,
        run_id: u64,
        bindings: Vec<(String, Value)>,
        output: Value,
        console: Vec<String>,
    },
    /// Console lines of a run that raised.
    Console { unit: UnitId, lines: Vec<String> },
    /// Drop names this unit no longer defines from the environment.
    Retract { unit: UnitId, names: Vec<String> },
    /// The unit was deleted; drop its status and output.
    Forget(UnitId),
    /// `completion.copilot` changed; the host starts or stops the service.
    CompletionToggled(bool),
    /// The execution queue drained.
    PassFinished { pass_id: u64 },
    Exit,
}

/// Decision returned by the core after handling a single `RuntimeEvent`.
#[derive(Debug, Clone)]
pub struct CoreStep {
    /// Commands the IO shell should execute, in order.
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl CoreRuntime {
    pub(super) fn handle_create(
        &mut self,
        unit: UnitId,
        source: String,
        index: Option<usize>,
        disabled: bool,
        out: &mut Vec<CoreCommand>,
    ) {
        if self.units.contains_key(&unit) {
            warn!(%unit, "create for existing unit; treating as edit");
            self.apply_source(unit, source, true, out);
            return;
        }

        self.graph.insert(unit, index);
        if disabled {
            self.graph.set_disabled(unit, true);
        }
        self.units.insert(unit, UnitInfo::new(unit));
        self.graph_dirty = true;
        info!(%unit, disabled, "unit created");

        let run = self.config.runtime.auto_instantiate;
        self.apply_source(unit, source, run, out);
    }

    pub(super) fn handle_edit(&mut self, unit: UnitId, source: String, out: &mut Vec<CoreCommand>) {
        if !self.units.contains_key(&unit) {
            warn!(%unit, "edit for unknown unit; ignoring");
            return;
        }
        self.apply_source(unit, source, true, out);
    }

    /// Re-analyse `unit` with new source, update the graph and schedule.
    fn apply_source(&mut self, unit: UnitId, source: String, run: bool, out: &mut Vec<CoreCommand>) {
        let analysis = analyze(&source);

        let Some(info) = self.units.get_mut(&unit) else {
            return;
        };
        match analysis {
            Err(err) => {
                // Previous definitions stay in the graph so downstream units
                // keep their last-good inputs.
                info!(%unit, error = %err, "unit failed to parse");
                info.syntax_error = Some(err);
                let recovered = self.refresh_structure(out);
                self.run_or_mark(BTreeSet::new(), recovered, true, out);
            }
            Ok(analysis) => {
                info.syntax_error = None;
                info.program = Some(analysis.program);

                let removed: Vec<String> = self
                    .graph
                    .defs_of(unit)
                    .iter()
                    .filter(|name| !analysis.defs.contains(name))
                    .cloned()
                    .collect();

                debug!(
                    %unit,
                    defs = ?analysis.defs,
                    refs = ?analysis.refs,
                    "unit analysed"
                );
                self.graph.upsert(unit, analysis.defs, analysis.refs);
                self.graph_dirty = true;

                if !removed.is_empty() {
                    out.push(CoreCommand::Retract {
                        unit,
                        names: removed,
                    });
                }

                let recovered = self.refresh_structure(out);
                self.run_or_mark(BTreeSet::from([unit]), recovered, run, out);
            }
        }
    }

    pub(super) fn handle_delete(&mut self, unit: UnitId, out: &mut Vec<CoreCommand>) {
        if !self.units.contains_key(&unit) {
            warn!(%unit, "delete for unknown unit; ignoring");
            return;
        }

        self.queue.retain(|u| *u != unit);
        self.cancel_if_running(unit, UnitStatus::Idle, out);

        let names = self.graph.defs_of(unit).to_vec();
        let orphaned = self.graph.remove(unit);
        self.units.remove(&unit);
        self.graph_dirty = true;
        info!(%unit, ?orphaned, "unit deleted");

        out.push(CoreCommand::Retract { unit, names });
        out.push(CoreCommand::Forget(unit));

        let recovered = self.refresh_structure(out);
        self.run_or_mark(BTreeSet::new(), recovered, true, out);
    }

    pub(super) fn handle_set_disabled(
        &mut self,
        unit: UnitId,
        disabled: bool,
        out: &mut Vec<CoreCommand>,
    ) {
        if !self.units.contains_key(&unit) {
            warn!(%unit, "disable for unknown unit; ignoring");
            return;
        }
        if self.graph.is_disabled(unit) == disabled {
            return;
        }

        self.graph.set_disabled(unit, disabled);
        self.graph_dirty = true;
        info!(%unit, disabled, "unit disabled flag changed");

        if disabled {
            let names = self.graph.defs_of(unit).to_vec();
            if !names.is_empty() {
                out.push(CoreCommand::Retract { unit, names });
            }
        }

        let recovered = self.refresh_structure(out);
        self.run_or_mark(BTreeSet::new(), recovered, true, out);
    }

    pub(super) fn handle_run(&mut self, units: Vec<UnitId>, out: &mut Vec<CoreCommand>) {
        let explicit: BTreeSet<UnitId> = units
            .into_iter()
            .filter(|u| {
                let known = self.units.contains_key(u);
                if !known {
                    warn!(unit = %u, "run for unknown unit; ignoring");
                }
                known
            })
            .collect();
        self.run_or_mark(explicit, BTreeSet::new(), true, out);
    }

    pub(super) fn handle_run_stale(&mut self, out: &mut Vec<CoreCommand>) {
        let stale: BTreeSet<UnitId> = self
            .units
            .values()
            .filter(|info| info.status == UnitStatus::Stale)
            .map(|info| info.id)
            .filter(|u| self.is_runnable(*u))
            .collect();

        info!(count = stale.len(), "running stale units");
        self.schedule(stale, true, out);
    }

    pub(super) fn handle_interrupt(&mut self, target: InterruptTarget, out: &mut Vec<CoreCommand>) {
        match target {
            InterruptTarget::All => {
                let running = self.running.as_ref().map(|r| r.unit);
                if let Some(unit) = running {
                    self.cancel_if_running(unit, UnitStatus::Idle, out);
                }

                let queued = std::mem::take(&mut self.queue);
                info!(dropped = queued.len(), "interrupt: cancelling pass");
                for unit in queued {
                    if Some(unit) != running {
                        self.set_status(unit, UnitStatus::Stale, None, out);
                    }
                }
            }
            InterruptTarget::Unit(unit) => {
                let is_running = self.running.as_ref().is_some_and(|r| r.unit == unit);
                let was_queued = self.queue.contains(&unit);

                if is_running {
                    self.cancel_if_running(unit, UnitStatus::Idle, out);
                    self.queue.retain(|u| *u != unit);
                } else if was_queued {
                    self.queue.retain(|u| *u != unit);
                    self.set_status(unit, UnitStatus::Idle, None, out);
                } else {
                    debug!(%unit, "interrupt: unit neither running nor queued");
                    return;
                }

                info!(%unit, "interrupt: unit stopped");
                for child in self.graph.descendants(unit) {
                    if self.queue.contains(&child) {
                        self.queue.retain(|u| *u != child);
                        self.set_status(child, UnitStatus::Stale, None, out);
                    }
                }
            }
        }
    }

    pub(super) fn handle_set_config(&mut self, config: UserConfig, out: &mut Vec<CoreCommand>) {
        let toggled = config.completion.copilot != self.config.completion.copilot;

        if config.runtime.on_cell_change != self.config.runtime.on_cell_change {
            info!(mode = ?config.runtime.on_cell_change, "reactivity mode changed");
        }

        let copilot = config.completion.copilot;
        self.config = config;

        if toggled {
            info!(enabled = copilot, "completion service toggled");
            out.push(CoreCommand::CompletionToggled(copilot));
        }
    }

    pub(super) fn handle_shutdown(&mut self, out: &mut Vec<CoreCommand>) {
        if let Some(unit) = self.running.as_ref().map(|r| r.unit) {
            self.cancel_if_running(unit, UnitStatus::Idle, out);
        }
        self.queue.clear();
        info!("shutdown requested");
        out.push(CoreCommand::Exit);
    }

    /// Handle a completion report from the executor.
    pub(super) fn handle_finished(
        &mut self,
        unit: UnitId,
        run_id: u64,
        outcome: UnitOutcome,
        out: &mut Vec<CoreCommand>,
    ) {
        let Some(running) = self.running.take_if(|r| r.run_id == run_id) else {
            debug!(%unit, run_id, "ignoring report from superseded run");
            return;
        };

        if !self.units.contains_key(&unit) {
            debug!(%unit, run_id, "unit deleted while running; dropping result");
            return;
        }

        if running.cancelled || matches!(outcome, UnitOutcome::Cancelled) {
            info!(%unit, run_id, "discarding result of cancelled run");
            if self.queue.contains(&unit) {
                self.set_status(unit, UnitStatus::Queued, None, out);
            } else if let Some(blocker) = self.structure.blocker(unit).cloned() {
                self.set_status(unit, blocker.status(), blocker.error(), out);
            } else {
                self.set_status(unit, running.settle, None, out);
            }
            return;
        }

        match outcome {
            UnitOutcome::Completed(evaluation) => {
                info!(%unit, run_id, "unit completed; publishing");
                if let Some(info) = self.units.get_mut(&unit) {
                    info.status = UnitStatus::Idle;
                    info.error = None;
                }
                out.push(CoreCommand::Publish {
                    unit,
                    run_id,
                    bindings: evaluation.bindings,
                    output: evaluation.output,
                    console: evaluation.console,
                });
            }
            UnitOutcome::Raised { error, console } => {
                warn!(%unit, run_id, error = %error, "unit raised");
                if !console.is_empty() {
                    out.push(CoreCommand::Console {
                        unit,
                        lines: console,
                    });
                }
                self.set_status(
                    unit,
                    UnitStatus::Error,
                    Some(UnitError::Runtime(error)),
                    out,
                );

                // Nothing downstream may observe a failed upstream run.
                for child in self.graph.descendants(unit) {
                    if !self.is_runnable(child) {
                        continue;
                    }
                    self.queue.retain(|u| *u != child);
                    self.set_status(child, UnitStatus::Stale, None, out);
                }
            }
            UnitOutcome::Cancelled => {}
        }
    }

    /// Schedule `explicit` and `recovered` according to the reactivity mode.
    ///
    /// With `run == false` everything that would have been scheduled is
    /// marked stale instead.
    fn run_or_mark(
        &mut self,
        explicit: BTreeSet<UnitId>,
        recovered: BTreeSet<UnitId>,
        run: bool,
        out: &mut Vec<CoreCommand>,
    ) {
        let mode = self.config.runtime.on_cell_change;

        if run && mode == OnCellChange::Autorun {
            let roots: BTreeSet<UnitId> = explicit.union(&recovered).copied().collect();
            self.schedule(roots, true, out);
            return;
        }

        let mut stale: BTreeSet<UnitId> = BTreeSet::new();
        for root in explicit.iter().chain(recovered.iter()) {
            stale.insert(*root);
            stale.extend(self.graph.descendants(*root));
        }

        if run {
            // Lazy: only the explicit units execute.
            for unit in &explicit {
                stale.remove(unit);
            }
            self.schedule(explicit, false, out);
        }

        self.mark_stale(stale, out);
    }
}
