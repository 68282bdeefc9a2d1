// tests/config_loading.rs

mod common;
use crate::common::builders::NotebookBuilder;

use std::io::Write;

use celldag::config::{NotebookConfig, load_and_validate, load_from_str, syntax_report};
use celldag::errors::CelldagError;
use celldag::types::OnCellChange;
use tempfile::NamedTempFile;

#[test]
fn loads_a_full_notebook_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[runtime]
on_cell_change = "lazy"
auto_instantiate = false
queue_capacity = 8

[completion]
copilot = true

[[cell]]
code = "x = 1"

[[cell]]
code = "y = x + 1"
disabled = true
"#
    )
    .unwrap();

    let cfg = load_and_validate(file.path()).unwrap();
    assert_eq!(cfg.runtime.on_cell_change, OnCellChange::Lazy);
    assert!(!cfg.runtime.auto_instantiate);
    assert_eq!(cfg.runtime.queue_capacity, 8);
    assert_eq!(cfg.cells.len(), 2);
    assert!(cfg.cells[1].disabled);

    let user = cfg.user_config();
    assert_eq!(user.runtime.on_cell_change, OnCellChange::Lazy);
    assert!(user.completion.copilot);
}

#[test]
fn sections_default_when_missing() {
    let raw = load_from_str("[[cell]]\ncode = \"x = 1\"\n").unwrap();
    let cfg = NotebookConfig::try_from(raw).unwrap();

    assert_eq!(cfg.runtime.on_cell_change, OnCellChange::Autorun);
    assert!(cfg.runtime.auto_instantiate);
    assert_eq!(cfg.runtime.queue_capacity, 64);
    assert!(!cfg.completion.copilot);
}

#[test]
fn notebook_without_cells_is_rejected() {
    let result = NotebookConfig::try_from(NotebookBuilder::new().raw());
    match result {
        Err(CelldagError::ConfigError(msg)) => assert!(msg.contains("[[cell]]")),
        other => panic!("expected ConfigError, got {other:?}"),
    }
}

#[test]
fn zero_queue_capacity_is_rejected() {
    let raw = NotebookBuilder::new().cell("x = 1").queue_capacity(0).raw();
    assert!(matches!(
        NotebookConfig::try_from(raw),
        Err(CelldagError::ConfigError(_))
    ));
}

#[test]
fn unknown_reactivity_mode_is_a_toml_error() {
    let result = load_from_str("[runtime]\non_cell_change = \"eager\"\n[[cell]]\ncode = \"x\"\n");
    assert!(matches!(result, Err(CelldagError::TomlError(_))));
}

#[test]
fn missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_and_validate(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(CelldagError::IoError(_))));
}

#[test]
fn broken_cells_load_and_are_reported() {
    let cfg = NotebookBuilder::new()
        .cell("x = 1")
        .cell("y = (")
        .disabled_cell("z = x")
        .build();

    let report = syntax_report(&cfg);
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].0, 1);
}
