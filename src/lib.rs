// src/lib.rs

pub mod analyze;
pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod kernel;
pub mod lang;
pub mod logging;
pub mod services;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::analyze::analyze;
use crate::cli::CliArgs;
use crate::config::{NotebookConfig, load_and_validate, syntax_report};
use crate::dag::{DependencyGraph, Structure};
use crate::engine::{KernelEvent, RuntimeOptions};
use crate::errors::CelldagError;
use crate::exec::ScriptExecutor;
use crate::kernel::Kernel;
use crate::services::{LoggingServiceHost, spawn_service_watcher};
use crate::types::{InterruptTarget, UnitId, UnitStatus};

/// Pause before retrying a submission rejected with `QueueFull`.
const BACKOFF: Duration = Duration::from_millis(5);

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - notebook loading
/// - kernel (control queue, scheduler, runtime environment)
/// - completion service host
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let notebook_path = PathBuf::from(&args.notebook);
    let cfg = load_and_validate(&notebook_path)
        .with_context(|| format!("loading notebook {}", notebook_path.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let options = RuntimeOptions {
        config: cfg.user_config(),
        queue_capacity: cfg.runtime.queue_capacity,
    };
    let kernel = Kernel::spawn(ScriptExecutor, options);
    let services = spawn_service_watcher(
        &kernel,
        LoggingServiceHost::default(),
        cfg.completion.copilot,
    );

    // Console lines are streamed as they happen; the summary comes at the end.
    let console = if args.json {
        None
    } else {
        let mut events = kernel.subscribe_status();
        Some(tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let KernelEvent::Console { unit, line } = event {
                    println!("[{unit}] {line}");
                }
            }
        }))
    };

    let units = seed_cells(&kernel, &cfg).await?;
    info!(units = units.len(), "notebook loaded");

    tokio::select! {
        result = kernel.wait_idle() => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; stopping running units");
            kernel.submit_interrupt(InterruptTarget::All)?;
            kernel.wait_idle().await?;
        }
    }

    if args.json {
        let snapshot = kernel.env_snapshot();
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    }

    kernel.shutdown().await?;
    if let Some(console) = console {
        console.await.context("console printer panicked")?;
    }
    services.await.context("service watcher panicked")?;

    if !args.json {
        print_summary(&kernel, &units);
    }

    Ok(())
}

/// Create one unit per cell, in presentation order.
///
/// A notebook larger than the control queue is fed in as the kernel drains
/// it.
async fn seed_cells(kernel: &Kernel, cfg: &NotebookConfig) -> Result<Vec<UnitId>> {
    let mut units = Vec::with_capacity(cfg.cells.len());
    for cell in &cfg.cells {
        let unit = loop {
            let submitted = if cell.disabled {
                kernel.create_disabled_unit(cell.code.as_str(), None)
            } else {
                kernel.create_unit(cell.code.as_str(), None)
            };
            match submitted {
                Err(CelldagError::QueueFull) => {
                    debug!("control queue full; backing off");
                    tokio::time::sleep(BACKOFF).await;
                }
                other => break other?,
            }
        };
        units.push(unit);
    }
    Ok(units)
}

fn print_summary(kernel: &Kernel, units: &[UnitId]) {
    let mut errors = 0usize;
    for unit in units {
        let Some(state) = kernel.state(*unit) else {
            continue;
        };
        match (&state.error, kernel.get_output(*unit).bound()) {
            (Some(error), _) => {
                errors += 1;
                println!("{unit} {}: {error}", state.status);
            }
            (None, Some(value)) if state.status == UnitStatus::Idle => {
                println!("{unit} {}: {value}", state.status);
            }
            (None, _) => println!("{unit} {}", state.status),
        }
    }
    if errors > 0 {
        warn!(errors, "some cells ended in error");
    }
}

/// Dry-run output: per-cell analysis and the dependency structure, without
/// executing anything.
fn print_dry_run(cfg: &NotebookConfig) {
    println!("celldag dry-run");
    println!("  runtime.on_cell_change = {:?}", cfg.runtime.on_cell_change);
    println!("  runtime.auto_instantiate = {}", cfg.runtime.auto_instantiate);
    println!("  runtime.queue_capacity = {}", cfg.runtime.queue_capacity);
    println!("  completion.copilot = {}", cfg.completion.copilot);
    println!();

    let mut graph = DependencyGraph::new();
    let mut syntax_errors = BTreeMap::new();

    println!("cells ({}):", cfg.cells.len());
    for (i, cell) in cfg.cells.iter().enumerate() {
        let unit = UnitId(i as u64 + 1);
        graph.insert(unit, None);
        if cell.disabled {
            graph.set_disabled(unit, true);
        }

        println!("  - {unit}");
        match analyze(&cell.code) {
            Ok(analysis) => {
                if !analysis.defs.is_empty() {
                    println!("      defines: {:?}", analysis.defs);
                }
                if !analysis.refs.is_empty() {
                    println!("      reads: {:?}", analysis.refs);
                }
                if analysis.is_async() {
                    println!("      async: true");
                }
                graph.upsert(unit, analysis.defs, analysis.refs);
            }
            Err(err) => {
                syntax_errors.insert(unit, err);
            }
        }
        if cell.disabled {
            println!("      disabled: true");
        }
    }

    let report = syntax_report(cfg);
    if !report.is_empty() {
        println!();
        println!("syntax errors:");
        for (index, message) in report {
            println!("  - #{}: {message}", index + 1);
        }
    }

    let structure = Structure::derive(&graph, &syntax_errors);
    let blocked: Vec<_> = structure.iter().collect();
    if !blocked.is_empty() {
        println!();
        println!("blocked:");
        for (unit, blocker) in blocked {
            match blocker.error() {
                Some(error) => println!("  - {unit} ({}): {error}", blocker.status()),
                None => println!("  - {unit} ({})", blocker.status()),
            }
        }
    }

    let runnable: BTreeSet<UnitId> = graph.units().filter(|u| !structure.is_blocked(*u)).collect();
    println!();
    let order: Vec<String> = graph
        .topological_order(&runnable)
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("execution order: {}", order.join(" -> "));

    debug!("dry-run complete (no execution)");
}
