// tests/kernel_reactivity.rs
//
// End-to-end behaviour of a running kernel with the real interpreter.

mod common;
use crate::common::builders::UserConfigBuilder;
use crate::common::{init_tracing, spawn_kernel, wait_for_status, with_timeout};

use std::error::Error;

use celldag::config::UserConfig;
use celldag::engine::{KernelEvent, Lookup};
use celldag::errors::UnitError;
use celldag::lang::Value;
use celldag::types::UnitStatus;

type TestResult = Result<(), Box<dyn Error>>;

fn int(v: i64) -> Lookup {
    Lookup::Bound(Value::Int(v))
}

#[tokio::test]
async fn edit_matches_running_from_scratch() -> TestResult {
    init_tracing();

    let (edited, _) = spawn_kernel(UserConfig::default());
    let a = edited.create_unit("x = 1", None)?;
    edited.create_unit("y = x * 2", None)?;
    edited.create_unit("z = y + x\nz", None)?;
    with_timeout(edited.wait_idle()).await?;
    edited.submit_edit(a, "x = 5")?;
    with_timeout(edited.wait_idle()).await?;

    let (fresh, _) = spawn_kernel(UserConfig::default());
    fresh.create_unit("x = 5", None)?;
    fresh.create_unit("y = x * 2", None)?;
    fresh.create_unit("z = y + x\nz", None)?;
    with_timeout(fresh.wait_idle()).await?;

    assert_eq!(edited.get("z"), int(15));
    let (left, right) = (edited.env_snapshot(), fresh.env_snapshot());
    assert_eq!(left.values, right.values);
    assert_eq!(left.outputs, right.outputs);

    edited.shutdown().await?;
    fresh.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn resubmitting_the_same_source_reruns_with_identical_results() -> TestResult {
    init_tracing();
    let (kernel, executor) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("x = 3", None)?;
    let b = kernel.create_unit("y = x * x\ny", None)?;
    with_timeout(kernel.wait_idle()).await?;
    let before = kernel.env_snapshot();

    executor.clear();
    kernel.submit_edit(a, "x = 3")?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(executor.started(), vec![a, b]);
    assert_eq!(kernel.env_snapshot(), before);
    assert_eq!(kernel.get_output(b), int(9));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn cycle_is_reported_and_recovers_after_one_edit() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("a = b + 1", None)?;
    let b = kernel.create_unit("b = a + 1", None)?;
    with_timeout(kernel.wait_idle()).await?;

    for unit in [a, b] {
        let state = kernel.state(unit).unwrap();
        assert_eq!(state.status, UnitStatus::Error);
        assert!(matches!(state.error, Some(UnitError::Cycle { ref units }) if units == &vec![a, b]));
    }

    kernel.submit_edit(b, "b = 1")?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(kernel.status(a), Some(UnitStatus::Idle));
    assert_eq!(kernel.status(b), Some(UnitStatus::Idle));
    assert_eq!(kernel.get("a"), int(2));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn runtime_fault_leaves_descendants_stale_with_old_values() -> TestResult {
    init_tracing();
    let (kernel, executor) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("x = 5", None)?;
    let b = kernel.create_unit("y = 10 // x", None)?;
    let c = kernel.create_unit("z = y + 1\nz", None)?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get_output(c), int(3));

    executor.clear();
    kernel.submit_edit(a, "x = 0")?;
    with_timeout(kernel.wait_idle()).await?;

    let state = kernel.state(b).unwrap();
    assert_eq!(state.status, UnitStatus::Error);
    assert!(matches!(state.error, Some(UnitError::Runtime(_))));

    assert_eq!(kernel.status(c), Some(UnitStatus::Stale));
    assert_eq!(kernel.get("z"), int(3));
    assert_eq!(kernel.get_output(c), int(3));
    assert_eq!(executor.runs_of(c), 0);

    // Fixing the input runs the whole subtree again.
    kernel.submit_edit(a, "x = 2")?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get_output(c), int(6));
    assert_eq!(kernel.status(b), Some(UnitStatus::Idle));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn disabling_one_definer_resolves_a_conflict() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("y = 1", None)?;
    let b = kernel.create_unit("y = 2", None)?;
    let c = kernel.create_unit("w = y * 10", None)?;
    with_timeout(kernel.wait_idle()).await?;

    for unit in [a, b, c] {
        let state = kernel.state(unit).unwrap();
        assert_eq!(state.status, UnitStatus::Error, "{unit}");
        assert!(matches!(
            state.error,
            Some(UnitError::MultipleDefinition { ref name, .. }) if name == "y"
        ));
    }

    kernel.submit_disable(a, true)?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(kernel.status(a), Some(UnitStatus::Disabled));
    assert_eq!(kernel.status(b), Some(UnitStatus::Idle));
    assert_eq!(kernel.status(c), Some(UnitStatus::Idle));
    assert_eq!(kernel.get("y"), int(2));
    assert_eq!(kernel.get("w"), int(20));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn deleting_one_definer_resolves_a_conflict() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("y = 1", None)?;
    kernel.create_unit("y = 2", None)?;
    let c = kernel.create_unit("w = y * 10", None)?;
    with_timeout(kernel.wait_idle()).await?;

    kernel.submit_delete(a)?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(kernel.status(a), None);
    assert_eq!(kernel.status(c), Some(UnitStatus::Idle));
    assert_eq!(kernel.get("w"), int(20));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn siblings_rerun_in_presentation_order() -> TestResult {
    init_tracing();
    let (kernel, executor) = spawn_kernel(UserConfig::default());

    let one = kernel.create_unit("x = 1", None)?;
    let two = kernel.create_unit("a = x + 1", None)?;
    let three = kernel.create_unit("b = x + 2", None)?;
    with_timeout(kernel.wait_idle()).await?;

    for round in 2..6 {
        executor.clear();
        kernel.submit_edit(one, format!("x = {round}"))?;
        with_timeout(kernel.wait_idle()).await?;
        assert_eq!(executor.started(), vec![one, two, three]);
    }
    assert_eq!(executor.peak_concurrency(), 1);

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn superseded_run_never_publishes() -> TestResult {
    init_tracing();
    let (kernel, executor) = spawn_kernel(UserConfig::default());

    kernel.create_unit("x = 1", None)?;
    let slow = kernel.create_unit("y = await delay(50, x)\ny", None)?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get("y"), int(1));

    let mut events = kernel.subscribe_status();
    kernel.submit_edit(slow, "y = await delay(300, x + 10)\ny")?;
    with_timeout(wait_for_status(&mut events, slow, UnitStatus::Running)).await;

    kernel.submit_edit(slow, "y = await delay(50, x + 100)\ny")?;
    with_timeout(kernel.wait_idle()).await?;

    let mut outputs = Vec::new();
    while let Some(event) = events.try_next() {
        if let KernelEvent::Output { unit, value } = event {
            if unit == slow {
                outputs.push(value);
            }
        }
    }

    assert_eq!(outputs, vec![Value::Int(101)]);
    assert_eq!(kernel.get("y"), int(101));
    assert_eq!(executor.peak_concurrency(), 1);

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn lazy_mode_waits_for_run_stale() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfigBuilder::new().lazy().build());

    let a = kernel.create_unit("x = 1", None)?;
    let b = kernel.create_unit("y = x + 1", None)?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get("y"), int(2));

    kernel.submit_edit(a, "x = 10")?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get("x"), int(10));
    assert_eq!(kernel.get("y"), int(2));
    assert_eq!(kernel.status(b), Some(UnitStatus::Stale));

    kernel.submit_run_stale()?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get("y"), int(11));
    assert_eq!(kernel.status(b), Some(UnitStatus::Idle));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn interrupt_stops_a_long_running_unit() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let mut events = kernel.subscribe_status();
    let slow = kernel.create_unit("x = await delay(10000, 1)", None)?;
    let reader = kernel.create_unit("y = x", None)?;
    with_timeout(wait_for_status(&mut events, slow, UnitStatus::Running)).await;

    kernel.submit_interrupt(celldag::types::InterruptTarget::All)?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(kernel.status(slow), Some(UnitStatus::Idle));
    assert_eq!(kernel.get("x"), Lookup::Unbound);
    assert_ne!(kernel.status(reader), Some(UnitStatus::Idle));

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn deleted_unit_output_is_removed() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let a = kernel.create_unit("x = 4\nx * 2", None)?;
    with_timeout(kernel.wait_idle()).await?;
    assert_eq!(kernel.get_output(a), int(8));

    let mut events = kernel.subscribe_status();
    kernel.submit_delete(a)?;
    with_timeout(kernel.wait_idle()).await?;

    assert_eq!(kernel.get_output(a), Lookup::Unbound);
    assert_eq!(kernel.get("x"), Lookup::Unbound);
    assert!(kernel.units().is_empty());

    let mut removed = false;
    while let Some(event) = events.try_next() {
        removed |= event == KernelEvent::Removed { unit: a };
    }
    assert!(removed);

    kernel.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn console_lines_are_streamed_to_subscribers() -> TestResult {
    init_tracing();
    let (kernel, _) = spawn_kernel(UserConfig::default());

    let mut events = kernel.subscribe_status();
    let a = kernel.create_unit("print(\"hello\", 42)", None)?;
    with_timeout(kernel.wait_idle()).await?;

    let mut lines = Vec::new();
    while let Some(event) = events.try_next() {
        if let KernelEvent::Console { unit, line } = event {
            assert_eq!(unit, a);
            lines.push(line);
        }
    }
    assert_eq!(lines, vec!["hello 42".to_string()]);

    kernel.shutdown().await?;
    Ok(())
}
