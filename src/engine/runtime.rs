// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

use crate::dag::GraphSnapshot;
use crate::engine::core::CoreRuntime;
use crate::engine::env::Env;
use crate::engine::events::KernelEvent;
use crate::engine::queue::ControlReceiver;
use crate::engine::{CoreCommand, RuntimeEvent};
use crate::errors::Result;
use crate::exec::{ActiveRun, UnitExecutor, spawn_unit};
use crate::types::{UnitId, UnitStatus};

/// What the runtime has applied so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Sequence number of the last control request applied.
    pub applied_seq: u64,
    /// No unit running or queued.
    pub idle: bool,
    /// The runtime loop has exited.
    pub stopped: bool,
}

/// Channels the runtime publishes observable state on.
#[derive(Debug, Clone)]
pub struct RuntimeOutputs {
    pub env: Env,
    pub events: broadcast::Sender<KernelEvent>,
    pub progress: watch::Sender<Progress>,
    pub graph: watch::Sender<Arc<GraphSnapshot>>,
}

/// Drives the scheduler core in response to control requests and unit
/// completions, and delegates unit execution to a `UnitExecutor`.
///
/// This is a pure IO shell around `CoreRuntime`, which contains all the
/// scheduling semantics. This struct handles async IO: reading requests and
/// completions, spawning and cancelling runs, applying publishes to the
/// environment and broadcasting events.
pub struct Runtime<E: UnitExecutor> {
    core: CoreRuntime,
    control_rx: ControlReceiver,
    finished_tx: mpsc::Sender<RuntimeEvent>,
    finished_rx: mpsc::Receiver<RuntimeEvent>,
    executor: Arc<E>,
    outputs: RuntimeOutputs,
    active: Option<ActiveRun>,
    applied_seq: u64,
}

impl<E: UnitExecutor> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .field("applied_seq", &self.applied_seq)
            .finish_non_exhaustive()
    }
}

impl<E: UnitExecutor> Runtime<E> {
    pub fn new(
        core: CoreRuntime,
        control_rx: ControlReceiver,
        executor: Arc<E>,
        outputs: RuntimeOutputs,
    ) -> Self {
        let (finished_tx, finished_rx) = mpsc::channel(16);
        Self {
            core,
            control_rx,
            finished_tx,
            finished_rx,
            executor,
            outputs,
            active: None,
            applied_seq: 0,
        }
    }

    /// Main event loop.
    ///
    /// - Consumes control requests and unit completions.
    /// - Feeds them into the core runtime.
    /// - Executes commands returned by the core (start, cancel, publish...).
    pub async fn run(mut self) -> Result<()> {
        info!("celldag runtime started");

        loop {
            // Completions first: a finished run frees the execution stream.
            let event = tokio::select! {
                biased;
                Some(done) = self.finished_rx.recv() => done,
                request = self.control_rx.recv() => match request {
                    Some(envelope) => RuntimeEvent::Request(envelope),
                    None => {
                        info!("control queue closed; exiting");
                        break;
                    }
                },
            };

            let seq = match &event {
                RuntimeEvent::Request(envelope) => Some(envelope.seq),
                RuntimeEvent::UnitFinished { .. } => None,
            };

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command);
            }

            if let Some(seq) = seq {
                self.applied_seq = seq;
            }
            self.report_progress(false);

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        self.control_rx.close();
        if let Some(active) = self.active.take() {
            active.cancel();
            active.handle.abort();
        }
        self.report_progress(true);
        info!("runtime exiting");
        Ok(())
    }

    /// Execute a single command from the core.
    fn execute_command(&mut self, command: CoreCommand) {
        match command {
            CoreCommand::Start(unit) => {
                let inputs = self.outputs.env.inputs(&unit.refs);
                debug!(
                    unit = %unit.unit,
                    run_id = unit.run_id,
                    inputs = inputs.len(),
                    "spawning unit run"
                );
                let run = spawn_unit(
                    Arc::clone(&self.executor),
                    unit,
                    inputs,
                    self.finished_tx.clone(),
                );
                self.active = Some(run);
            }
            CoreCommand::Cancel { unit, run_id } => match &self.active {
                Some(active) if active.unit.run_id == run_id => active.cancel(),
                _ => debug!(%unit, run_id, "cancel for run that is no longer active"),
            },
            CoreCommand::SetStatus(change) => {
                self.outputs
                    .env
                    .set_state(change.unit, change.status, change.error.clone());
                self.emit(KernelEvent::Status {
                    unit: change.unit,
                    status: change.status,
                    error: change.error,
                });
            }
            CoreCommand::Publish {
                unit,
                run_id,
                bindings,
                output,
                console,
            } => {
                debug!(%unit, run_id, names = bindings.len(), "publishing bindings");
                self.outputs.env.set_many(unit, bindings, output.clone());
                self.emit(KernelEvent::Status {
                    unit,
                    status: UnitStatus::Idle,
                    error: None,
                });
                self.emit(KernelEvent::Output {
                    unit,
                    value: output,
                });
                self.emit_console(unit, console);
            }
            CoreCommand::Console { unit, lines } => self.emit_console(unit, lines),
            CoreCommand::Retract { unit, names } => {
                debug!(%unit, ?names, "retracting bindings");
                self.outputs.env.retract(unit, &names);
            }
            CoreCommand::Forget(unit) => {
                self.outputs.env.forget(unit);
                self.emit(KernelEvent::Removed { unit });
            }
            CoreCommand::CompletionToggled(enabled) => {
                self.emit(KernelEvent::CompletionToggled { enabled });
            }
            CoreCommand::PassFinished { pass_id } => {
                self.emit(KernelEvent::PassFinished { pass_id });
            }
            CoreCommand::Exit => {
                info!("core issued Exit command");
            }
        }
    }

    fn emit_console(&self, unit: UnitId, lines: Vec<String>) {
        for line in lines {
            self.emit(KernelEvent::Console { unit, line });
        }
    }

    fn emit(&self, event: KernelEvent) {
        // No subscribers is fine.
        let _ = self.outputs.events.send(event);
    }

    fn report_progress(&mut self, stopped: bool) {
        if let Some(snapshot) = self.core.take_graph_snapshot() {
            self.outputs.graph.send_replace(Arc::new(snapshot));
        }

        let progress = Progress {
            applied_seq: self.applied_seq,
            idle: self.core.is_idle(),
            stopped,
        };
        self.outputs.progress.send_if_modified(|current| {
            if *current == progress {
                false
            } else {
                *current = progress;
                true
            }
        });
    }
}
