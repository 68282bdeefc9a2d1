// src/exec/runner.rs

//! Individual unit runner.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dag::ScheduledUnit;
use crate::engine::RuntimeEvent;
use crate::exec::backend::{UnitExecutor, UnitOutcome};
use crate::lang::{EvalError, Value};

/// Internal handle for the run currently occupying the execution stream.
///
/// - `cancel` is fired by the runtime when the core supersedes or
///   interrupts the run.
/// - `handle` is the Tokio task that is actually running the unit body.
#[derive(Debug)]
pub struct ActiveRun {
    pub unit: ScheduledUnit,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl ActiveRun {
    pub fn cancel(&self) {
        info!(
            unit = %self.unit.unit,
            run_id = self.unit.run_id,
            "cancellation requested for running unit"
        );
        self.cancel.cancel();
    }
}

/// Spawn a Tokio task executing `unit` and reporting a `UnitFinished` event.
///
/// Unlike a completed run, a cancelled run still reports back (with
/// [`UnitOutcome::Cancelled`] or whatever it produced before noticing); the
/// core decides what to discard.
///
/// The body runs in its own task so that a panic inside it is reported as a
/// raised fault instead of silently ending the run.
pub fn spawn_unit<E: UnitExecutor>(
    executor: Arc<E>,
    unit: ScheduledUnit,
    inputs: HashMap<String, Value>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> ActiveRun {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task_unit = unit.clone();

    let handle = tokio::spawn(async move {
        let id = task_unit.unit;
        let run_id = task_unit.run_id;
        debug!(unit = %id, run_id, "unit runner started");

        let mut body = {
            let token = token.clone();
            tokio::spawn(async move { executor.execute(&task_unit, inputs, token).await })
        };

        let joined = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            joined = &mut body => Some(joined),
        };

        let outcome = match joined {
            Some(joined) => outcome_of(joined),
            None => {
                // The next unit may only start once this body has stopped.
                body.abort();
                match body.await {
                    Err(err) if err.is_panic() => {
                        warn!(unit = %id, run_id, "cancelled unit body panicked")
                    }
                    _ => {}
                }
                UnitOutcome::Cancelled
            }
        };

        match &outcome {
            UnitOutcome::Completed(_) => debug!(unit = %id, run_id, "unit body completed"),
            UnitOutcome::Raised { error, .. } => {
                debug!(unit = %id, run_id, error = %error, "unit body raised")
            }
            UnitOutcome::Cancelled => info!(unit = %id, run_id, "unit run cancelled"),
        }

        if runtime_tx
            .send(RuntimeEvent::UnitFinished {
                unit: id,
                run_id,
                outcome,
            })
            .await
            .is_err()
        {
            warn!(unit = %id, run_id, "runtime gone; dropping unit result");
        }
    });

    ActiveRun {
        unit,
        cancel,
        handle,
    }
}

fn outcome_of(joined: Result<UnitOutcome, JoinError>) -> UnitOutcome {
    match joined {
        Ok(outcome) => outcome,
        Err(err) if err.is_panic() => {
            let payload = err.into_panic();
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown cause".to_string());
            warn!(%detail, "unit body panicked");
            UnitOutcome::Raised {
                error: EvalError::new(format!("unit body panicked: {detail}")),
                console: Vec::new(),
            }
        }
        Err(_) => UnitOutcome::Cancelled,
    }
}
