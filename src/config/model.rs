// src/config/model.rs

use serde::{Deserialize, Serialize};

use crate::types::OnCellChange;

/// Notebook file as read from TOML, before validation.
///
/// ```toml
/// [runtime]
/// on_cell_change = "autorun"
/// auto_instantiate = true
/// queue_capacity = 64
///
/// [completion]
/// copilot = false
///
/// [[cell]]
/// code = "x = 1"
///
/// [[cell]]
/// code = "y = x + 1"
/// disabled = true
/// ```
///
/// All sections are optional and have reasonable defaults; validation
/// happens in `TryFrom<RawConfigFile> for NotebookConfig`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub completion: CompletionConfig,

    /// Cells in presentation order (`[[cell]]` tables).
    #[serde(default)]
    pub cell: Vec<CellConfig>,
}

/// Validated notebook configuration.
///
/// Can only be obtained through `TryFrom<RawConfigFile>`.
#[derive(Debug, Clone)]
pub struct NotebookConfig {
    pub runtime: RuntimeSection,
    pub completion: CompletionConfig,
    pub cells: Vec<CellConfig>,
}

impl NotebookConfig {
    pub(crate) fn new_unchecked(
        runtime: RuntimeSection,
        completion: CompletionConfig,
        cells: Vec<CellConfig>,
    ) -> Self {
        Self {
            runtime,
            completion,
            cells,
        }
    }

    /// The part of the configuration that can change while the kernel runs.
    pub fn user_config(&self) -> UserConfig {
        UserConfig {
            runtime: RuntimeConfig {
                on_cell_change: self.runtime.on_cell_change,
                auto_instantiate: self.runtime.auto_instantiate,
            },
            completion: self.completion.clone(),
        }
    }
}

/// `[runtime]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeSection {
    /// `"autorun"` (default) or `"lazy"`.
    #[serde(default)]
    pub on_cell_change: OnCellChange,

    /// Run cells when the notebook is loaded.
    #[serde(default = "default_true")]
    pub auto_instantiate: bool,

    /// Capacity of the control request queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_queue_capacity() -> usize {
    64
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            on_cell_change: OnCellChange::default(),
            auto_instantiate: default_true(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

/// `[completion]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct CompletionConfig {
    /// Whether the copilot side-service should be running.
    #[serde(default)]
    pub copilot: bool,

    #[serde(default)]
    pub activate_on_typing: bool,
}

/// One `[[cell]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CellConfig {
    pub code: String,

    #[serde(default)]
    pub disabled: bool,
}

/// Scheduler-relevant runtime settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub on_cell_change: OnCellChange,

    #[serde(default = "default_true")]
    pub auto_instantiate: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            on_cell_change: OnCellChange::default(),
            auto_instantiate: true,
        }
    }
}

/// Configuration the host can replace at runtime via `SetUserConfig`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct UserConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub completion: CompletionConfig,
}
