// src/config/validate.rs

use crate::analyze::analyze;
use crate::config::model::{NotebookConfig, RawConfigFile};
use crate::errors::{CelldagError, Result};

impl TryFrom<RawConfigFile> for NotebookConfig {
    type Error = crate::errors::CelldagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(NotebookConfig::new_unchecked(
            raw.runtime,
            raw.completion,
            raw.cell,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_cells(cfg)?;
    validate_runtime_section(cfg)?;
    Ok(())
}

fn ensure_has_cells(cfg: &RawConfigFile) -> Result<()> {
    if cfg.cell.is_empty() {
        return Err(CelldagError::ConfigError(
            "notebook must contain at least one [[cell]] entry".to_string(),
        ));
    }
    Ok(())
}

fn validate_runtime_section(cfg: &RawConfigFile) -> Result<()> {
    // on_cell_change is strongly typed and validated during deserialization.

    if cfg.runtime.queue_capacity == 0 {
        return Err(CelldagError::ConfigError(
            "[runtime].queue_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

/// Cells whose code does not parse, as `(index, message)`.
///
/// These are not configuration errors: a notebook may be saved with a broken
/// cell, which then simply loads in the `error` state. Used by `--dry-run`.
pub fn syntax_report(cfg: &NotebookConfig) -> Vec<(usize, String)> {
    cfg.cells
        .iter()
        .enumerate()
        .filter_map(|(i, cell)| analyze(&cell.code).err().map(|e| (i, e.to_string())))
        .collect()
}
