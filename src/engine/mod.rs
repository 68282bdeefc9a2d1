// src/engine/mod.rs

//! Orchestration engine for celldag.
//!
//! This module ties together:
//! - the control request queue (edits, runs, interrupts, config changes)
//! - the scheduler core that turns requests into an ordered execution queue
//! - the runtime environment holding published bindings and statuses
//! - the main runtime event loop that reacts to:
//!   - control requests
//!   - unit completion reports
//!
//! The pure core state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use crate::config::UserConfig;
use crate::exec::UnitOutcome;
use crate::types::{InterruptTarget, UnitId};

/// A request from a collaborator, applied in submission order.
#[derive(Debug, Clone)]
pub enum ControlRequest {
    /// Insert a new unit at `index` in presentation order (or at the end).
    Create {
        unit: UnitId,
        source: String,
        index: Option<usize>,
        disabled: bool,
    },
    Edit {
        unit: UnitId,
        source: String,
    },
    Delete {
        unit: UnitId,
    },
    SetDisabled {
        unit: UnitId,
        disabled: bool,
    },
    /// Explicitly run these units (and, in autorun mode, their descendants).
    Run {
        units: Vec<UnitId>,
    },
    /// Run every stale unit that is not structurally blocked.
    RunStale,
    Interrupt(InterruptTarget),
    SetUserConfig(UserConfig),
    Shutdown,
}

/// A control request tagged with its submission sequence number.
#[derive(Debug, Clone)]
pub struct Envelope {
    pub seq: u64,
    pub request: ControlRequest,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub config: UserConfig,
    /// Capacity of the control request queue; submissions beyond it are
    /// rejected with `QueueFull`.
    pub queue_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            config: UserConfig::default(),
            queue_capacity: 64,
        }
    }
}

/// Events flowing into the runtime.
#[derive(Debug)]
pub enum RuntimeEvent {
    Request(Envelope),
    /// A unit run reported back; cancelled runs report too.
    UnitFinished {
        unit: UnitId,
        run_id: u64,
        outcome: UnitOutcome,
    },
}

pub mod core;
pub mod env;
pub mod event_handlers;
pub mod events;
pub mod queue;
pub mod runtime;

pub use core::CoreRuntime;
pub use env::{BoundValue, Env, EnvSnapshot, Lookup, UnitState};
pub use event_handlers::{CoreCommand, CoreStep};
pub use events::{KernelEvent, StatusSubscription};
pub use queue::{ControlReceiver, ControlSender, control_queue};
pub use runtime::{Progress, Runtime, RuntimeOutputs};
