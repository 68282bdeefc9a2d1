use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use celldag::dag::ScheduledUnit;
use celldag::exec::{ScriptExecutor, UnitExecutor, UnitOutcome};
use celldag::lang::Value;
use celldag::types::UnitId;
use tokio_util::sync::CancellationToken;

/// An executor that:
/// - evaluates units with the real interpreter
/// - records the order in which units were started
/// - tracks how many runs were in flight at the same time.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    inner: ScriptExecutor,
    started: Arc<Mutex<Vec<UnitId>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every unit started so far, in start order.
    pub fn started(&self) -> Vec<UnitId> {
        self.started.lock().unwrap().clone()
    }

    pub fn runs_of(&self, unit: UnitId) -> usize {
        self.started().iter().filter(|u| **u == unit).count()
    }

    /// Forget recorded starts, e.g. after notebook setup.
    pub fn clear(&self) {
        self.started.lock().unwrap().clear();
    }

    /// Highest number of runs observed in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the run future is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl UnitExecutor for RecordingExecutor {
    fn execute<'a>(
        &'a self,
        unit: &'a ScheduledUnit,
        inputs: HashMap<String, Value>,
        cancel: CancellationToken,
    ) -> Pin<Box<dyn Future<Output = UnitOutcome> + Send + 'a>> {
        Box::pin(async move {
            self.started.lock().unwrap().push(unit.unit);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _in_flight = InFlight(&self.active);

            self.inner.execute(unit, inputs, cancel).await
        })
    }
}
