#![allow(dead_code)]

pub use celldag_test_utils::builders;
pub use celldag_test_utils::{RecordingExecutor, init_tracing, spawn_kernel, with_timeout};

use celldag::engine::{KernelEvent, StatusSubscription};
use celldag::types::{UnitId, UnitStatus};

/// Read events until `unit` reports `status`.
pub async fn wait_for_status(events: &mut StatusSubscription, unit: UnitId, status: UnitStatus) {
    while let Some(event) = events.next().await {
        if let KernelEvent::Status { unit: u, status: s, .. } = event {
            if u == unit && s == status {
                return;
            }
        }
    }
    panic!("event stream closed before {unit} became {status}");
}
