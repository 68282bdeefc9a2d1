// src/kernel.rs

//! Public handle to a running notebook kernel.
//!
//! [`Kernel::spawn`] wires the control queue, the runtime environment, the
//! event channels and the runtime task together and returns a cloneable
//! handle. Every `submit_*` call is non-blocking: it either enqueues the
//! request or rejects it immediately.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::UserConfig;
use crate::dag::GraphSnapshot;
use crate::engine::{
    ControlRequest, ControlSender, CoreRuntime, Env, EnvSnapshot, KernelEvent, Lookup, Progress,
    Runtime, RuntimeOptions, RuntimeOutputs, StatusSubscription, UnitState, control_queue,
};
use crate::errors::{CelldagError, Result};
use crate::exec::UnitExecutor;
use crate::types::{InterruptTarget, UnitId, UnitStatus};

/// Buffered events per subscriber before it starts lagging.
const EVENT_BUFFER: usize = 1024;

/// Cloneable handle to a kernel task.
#[derive(Debug, Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

#[derive(Debug)]
struct KernelInner {
    control: ControlSender,
    env: Env,
    events: broadcast::Sender<KernelEvent>,
    progress: watch::Receiver<Progress>,
    graph: watch::Receiver<Arc<GraphSnapshot>>,
    /// Units known to exist from the submitter's point of view.
    live: Mutex<BTreeSet<UnitId>>,
    next_unit: AtomicU64,
    task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Kernel {
    /// Spawn the runtime task on the current Tokio runtime.
    pub fn spawn<E: UnitExecutor>(executor: E, options: RuntimeOptions) -> Self {
        let (control, control_rx) = control_queue(options.queue_capacity);
        let env = Env::new();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (progress_tx, progress) = watch::channel(Progress {
            applied_seq: 0,
            idle: true,
            stopped: false,
        });
        let (graph_tx, graph) = watch::channel(Arc::new(GraphSnapshot::default()));

        let outputs = RuntimeOutputs {
            env: env.clone(),
            events: events.clone(),
            progress: progress_tx,
            graph: graph_tx,
        };

        info!(
            mode = ?options.config.runtime.on_cell_change,
            queue_capacity = options.queue_capacity,
            "spawning kernel"
        );

        let core = CoreRuntime::new(options.config);
        let runtime = Runtime::new(core, control_rx, Arc::new(executor), outputs);
        let task = tokio::spawn(runtime.run());

        Self {
            inner: Arc::new(KernelInner {
                control,
                env,
                events,
                progress,
                graph,
                live: Mutex::new(BTreeSet::new()),
                next_unit: AtomicU64::new(1),
                task: Mutex::new(Some(task)),
            }),
        }
    }

    fn live(&self) -> MutexGuard<'_, BTreeSet<UnitId>> {
        self.inner
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a request concerning an existing unit.
    fn submit_for(&self, unit: UnitId, request: ControlRequest) -> Result<()> {
        let live = self.live();
        if !live.contains(&unit) {
            return Err(CelldagError::UnknownUnit(unit));
        }
        self.inner.control.submit(request)?;
        Ok(())
    }

    /// Create a unit at `index` in presentation order (end if `None`).
    ///
    /// Whether it runs right away follows `runtime.auto_instantiate`.
    pub fn create_unit(&self, source: impl Into<String>, index: Option<usize>) -> Result<UnitId> {
        self.create(source.into(), index, false)
    }

    /// Create a unit that starts out disabled and never runs until enabled.
    pub fn create_disabled_unit(
        &self,
        source: impl Into<String>,
        index: Option<usize>,
    ) -> Result<UnitId> {
        self.create(source.into(), index, true)
    }

    fn create(&self, source: String, index: Option<usize>, disabled: bool) -> Result<UnitId> {
        let mut live = self.live();
        let unit = UnitId(self.inner.next_unit.fetch_add(1, Ordering::Relaxed));
        self.inner.control.submit(ControlRequest::Create {
            unit,
            source,
            index,
            disabled,
        })?;
        live.insert(unit);
        debug!(%unit, disabled, "create submitted");
        Ok(unit)
    }

    pub fn submit_edit(&self, unit: UnitId, source: impl Into<String>) -> Result<()> {
        self.submit_for(
            unit,
            ControlRequest::Edit {
                unit,
                source: source.into(),
            },
        )
    }

    pub fn submit_delete(&self, unit: UnitId) -> Result<()> {
        let mut live = self.live();
        if !live.contains(&unit) {
            return Err(CelldagError::UnknownUnit(unit));
        }
        self.inner.control.submit(ControlRequest::Delete { unit })?;
        live.remove(&unit);
        Ok(())
    }

    pub fn submit_disable(&self, unit: UnitId, disabled: bool) -> Result<()> {
        self.submit_for(unit, ControlRequest::SetDisabled { unit, disabled })
    }

    pub fn submit_run(&self, units: impl IntoIterator<Item = UnitId>) -> Result<()> {
        let units: Vec<UnitId> = units.into_iter().collect();
        let live = self.live();
        if let Some(unknown) = units.iter().find(|u| !live.contains(u)) {
            return Err(CelldagError::UnknownUnit(*unknown));
        }
        self.inner.control.submit(ControlRequest::Run { units })?;
        Ok(())
    }

    pub fn submit_run_stale(&self) -> Result<()> {
        self.inner.control.submit(ControlRequest::RunStale)?;
        Ok(())
    }

    pub fn submit_interrupt(&self, target: InterruptTarget) -> Result<()> {
        match target {
            InterruptTarget::Unit(unit) => {
                self.submit_for(unit, ControlRequest::Interrupt(target))
            }
            InterruptTarget::All => {
                self.inner
                    .control
                    .submit(ControlRequest::Interrupt(target))?;
                Ok(())
            }
        }
    }

    pub fn submit_config(&self, config: UserConfig) -> Result<()> {
        self.inner
            .control
            .submit(ControlRequest::SetUserConfig(config))?;
        Ok(())
    }

    /// Ask the runtime to stop and wait for its task to finish.
    pub async fn shutdown(&self) -> Result<()> {
        match self.inner.control.submit(ControlRequest::Shutdown) {
            Ok(_) | Err(CelldagError::QueueClosed) => {}
            Err(err) => return Err(err),
        }

        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        match task {
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(join_err) => {
                    warn!(error = %join_err, "runtime task did not finish cleanly");
                    Err(CelldagError::Other(join_err.into()))
                }
            },
            None => Ok(()),
        }
    }

    /// Resolve once every request submitted before this call has been
    /// applied and no unit is queued or running.
    pub async fn wait_idle(&self) -> Result<()> {
        let target = self.inner.control.last_seq();
        let mut rx = self.inner.progress.clone();

        let progress = *rx
            .wait_for(|p| p.stopped || (p.applied_seq >= target && p.idle))
            .await
            .map_err(|_| CelldagError::QueueClosed)?;

        if progress.stopped && progress.applied_seq < target {
            return Err(CelldagError::QueueClosed);
        }
        Ok(())
    }

    /// Fresh stream of status, output and console events.
    pub fn subscribe_status(&self) -> StatusSubscription {
        StatusSubscription::new(self.inner.events.subscribe(), self.inner.progress.clone())
    }

    pub fn get_output(&self, unit: UnitId) -> Lookup {
        self.inner.env.output(unit)
    }

    pub fn get(&self, name: &str) -> Lookup {
        self.inner.env.get(name)
    }

    pub fn status(&self, unit: UnitId) -> Option<UnitStatus> {
        self.inner.env.status(unit)
    }

    pub fn state(&self, unit: UnitId) -> Option<UnitState> {
        self.inner.env.state(unit)
    }

    pub fn graph_snapshot(&self) -> GraphSnapshot {
        self.inner.graph.borrow().as_ref().clone()
    }

    pub fn env_snapshot(&self) -> EnvSnapshot {
        self.inner.env.snapshot()
    }

    /// Units in creation order that have not been deleted.
    pub fn units(&self) -> Vec<UnitId> {
        self.live().iter().copied().collect()
    }
}
