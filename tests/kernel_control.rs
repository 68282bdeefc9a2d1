// tests/kernel_control.rs
//
// Control queue admission, shutdown and the completion-service toggle.

mod common;
use crate::common::builders::UserConfigBuilder;
use crate::common::{init_tracing, spawn_kernel, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};

use celldag::config::UserConfig;
use celldag::engine::{ControlRequest, KernelEvent, control_queue};
use celldag::errors::CelldagError;
use celldag::services::{LoggingServiceHost, ServiceHost, spawn_service_watcher};
use celldag::types::{InterruptTarget, UnitId};

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn full_queue_rejects_without_blocking() -> TestResult {
    init_tracing();
    let (sender, mut receiver) = control_queue(2);

    assert_eq!(sender.submit(ControlRequest::RunStale)?, 1);
    assert_eq!(sender.submit(ControlRequest::RunStale)?, 2);
    assert!(matches!(
        sender.submit(ControlRequest::RunStale),
        Err(CelldagError::QueueFull)
    ));
    assert_eq!(sender.last_seq(), 2);

    let first = receiver.recv().await.unwrap();
    assert_eq!(first.seq, 1);
    assert_eq!(sender.submit(ControlRequest::RunStale)?, 3);

    receiver.close();
    assert!(matches!(
        sender.submit(ControlRequest::RunStale),
        Err(CelldagError::QueueClosed)
    ));
    Ok(())
}

#[tokio::test]
async fn requests_for_unknown_units_are_rejected() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let ghost = UnitId(99);
    assert!(matches!(
        kernel.submit_edit(ghost, "x = 1"),
        Err(CelldagError::UnknownUnit(u)) if u == ghost
    ));
    assert!(matches!(
        kernel.submit_run([ghost]),
        Err(CelldagError::UnknownUnit(_))
    ));
    assert!(matches!(
        kernel.submit_interrupt(InterruptTarget::Unit(ghost)),
        Err(CelldagError::UnknownUnit(_))
    ));

    let a = kernel.create_unit("x = 1", None)?;
    kernel.submit_delete(a)?;
    assert!(matches!(
        kernel.submit_edit(a, "x = 2"),
        Err(CelldagError::UnknownUnit(_))
    ));
    assert!(matches!(
        kernel.submit_delete(a),
        Err(CelldagError::UnknownUnit(_))
    ));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn unit_ids_are_never_reused() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("x = 1", None)?;
    kernel.submit_delete(a)?;
    let b = kernel.create_unit("x = 1", None)?;
    assert_ne!(a, b);
    assert_eq!(kernel.units(), vec![b]);

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_queue_and_subscriptions() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());
    let mut events = kernel.subscribe_status();

    kernel.create_unit("x = 1", None)?;
    with_timeout(kernel.wait_idle()).await?;
    kernel.shutdown().await?;

    assert!(matches!(
        kernel.create_unit("y = 2", None),
        Err(CelldagError::QueueClosed)
    ));

    // Buffered events are still delivered, then the stream ends.
    let mut seen = 0;
    while with_timeout(events.next()).await.is_some() {
        seen += 1;
    }
    assert!(seen > 0);
    Ok(())
}

#[tokio::test]
async fn graph_snapshot_tracks_topology() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("x = 1", None)?;
    let b = kernel.create_unit("y = x + 1", None)?;
    with_timeout(kernel.wait_idle()).await?;

    let snapshot = kernel.graph_snapshot();
    assert_eq!(snapshot.units.len(), 2);
    assert_eq!(snapshot.edges.len(), 1);
    assert_eq!((snapshot.edges[0].from, snapshot.edges[0].to), (a, b));
    assert_eq!(snapshot.edges[0].names, vec!["x".to_string()]);

    let json = serde_json::to_value(kernel.env_snapshot())?;
    assert_eq!(json["values"]["y"]["value"], 2);
    assert_eq!(json["units"][b.0.to_string()]["status"], "idle");

    kernel.shutdown().await?;
    Ok(())
}

/// Records every toggle it receives.
#[derive(Clone, Default)]
struct RecordingHost {
    toggles: Arc<Mutex<Vec<bool>>>,
}

impl ServiceHost for RecordingHost {
    fn start_completion(&mut self) -> anyhow::Result<()> {
        self.toggles.lock().unwrap().push(true);
        Ok(())
    }

    fn stop_completion(&mut self) -> anyhow::Result<()> {
        self.toggles.lock().unwrap().push(false);
        Ok(())
    }
}

#[tokio::test]
async fn completion_toggle_drives_the_service_host() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());
    let host = RecordingHost::default();
    let toggles = Arc::clone(&host.toggles);
    let watcher = spawn_service_watcher(&kernel, host, false);

    let mut events = kernel.subscribe_status();
    kernel.submit_config(UserConfigBuilder::new().copilot(true).build())?;
    kernel.submit_config(UserConfigBuilder::new().copilot(true).build())?;
    kernel.submit_config(UserConfigBuilder::new().copilot(false).build())?;
    with_timeout(kernel.wait_idle()).await?;

    let mut reported = Vec::new();
    while let Some(event) = events.try_next() {
        if let KernelEvent::CompletionToggled { enabled } = event {
            reported.push(enabled);
        }
    }
    assert_eq!(reported, vec![true, false]);

    kernel.shutdown().await?;
    with_timeout(watcher).await?;
    assert_eq!(*toggles.lock().unwrap(), vec![true, false]);
    Ok(())
}

#[tokio::test]
async fn logging_host_starts_when_initially_enabled() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfigBuilder::new().copilot(true).build());
    let watcher = spawn_service_watcher(&kernel, LoggingServiceHost::default(), true);

    kernel.shutdown().await?;
    let host = with_timeout(watcher).await?;
    assert!(host.is_running());
    Ok(())
}
