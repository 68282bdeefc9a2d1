// src/exec/backend.rs

//! Pluggable executor abstraction.
//!
//! The runtime talks to a `UnitExecutor` instead of calling the interpreter
//! directly. This makes it easy to swap in a recording or gated executor in
//! tests while keeping the production implementation in [`super::script`].

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use crate::dag::ScheduledUnit;
use crate::lang::{EvalError, Evaluation, Interruption, Value};

/// How a unit run ended.
#[derive(Debug, Clone)]
pub enum UnitOutcome {
    Completed(Evaluation),
    /// The body raised; `console` holds the lines printed before the fault.
    Raised {
        error: EvalError,
        console: Vec<String>,
    },
    /// The run stopped at a suspension point after cancellation.
    Cancelled,
}

impl From<Result<Evaluation, Interruption>> for UnitOutcome {
    fn from(result: Result<Evaluation, Interruption>) -> Self {
        match result {
            Ok(evaluation) => UnitOutcome::Completed(evaluation),
            Err(Interruption::Raised { error, console }) => UnitOutcome::Raised { error, console },
            Err(Interruption::Cancelled) => UnitOutcome::Cancelled,
        }
    }
}

/// Trait abstracting how a scheduled unit body is executed.
///
/// Implementations must observe `cancel` at their suspension points; they
/// are never asked to run two units at once.
pub trait UnitExecutor: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        unit: &'a ScheduledUnit,
        inputs: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = UnitOutcome> + Send + 'a>>;
}
