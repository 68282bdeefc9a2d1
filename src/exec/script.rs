// src/exec/script.rs

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::dag::ScheduledUnit;
use crate::exec::backend::{UnitExecutor, UnitOutcome};
use crate::lang::{Value, execute};

/// Production executor: evaluates the unit's program with the interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptExecutor;

impl UnitExecutor for ScriptExecutor {
    fn execute<'a>(
        &'a self,
        unit: &'a ScheduledUnit,
        inputs: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = UnitOutcome> + Send + 'a>> {
        Box::pin(async move {
            trace!(unit = %unit.unit, run_id = unit.run_id, inputs = inputs.len(), "evaluating");
            execute(&unit.program, inputs, &cancel).await.into()
        })
    }
}
